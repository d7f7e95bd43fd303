use alloy_primitives::{Address, B256, Bytes, U256, hex, keccak256};
use alloy_sol_types::{SolCall, SolEvent};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, info};
use wp_contract::WAVE_PORTAL_ADDRESS;
use wp_contract::abi::{NewWave, Wave, getAllWavesCall, getTotalWavesCall, waveCall};
use wp_provider::{Eip1193Provider, LogListener, RpcError, USER_REJECTED_CODE};

/// Failure switches. Each stays on until cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Faults {
    pub reject_connection: bool,
    pub reject_transactions: bool,
    pub revert_transactions: bool,
    pub fail_reads: bool,
    pub fail_mining: bool,
}

struct PendingTx {
    hash: String,
    from: Address,
    message: String,
}

struct LogSubscription {
    id: String,
    address: Address,
    topic: Option<B256>,
    listener: LogListener,
}

struct Chain {
    contract: Address,
    account: Address,
    authorized: bool,
    prompts: usize,
    waves: Vec<Wave>,
    clock: u64,
    block_number: u64,
    nonce: u64,
    auto_mine: bool,
    faults: Faults,
    pending: Vec<PendingTx>,
    receipts: HashMap<String, Value>,
    subscriptions: Vec<LogSubscription>,
    next_subscription: u64,
    queued_logs: Vec<Value>,
    hold_logs: bool,
    during_history_read: Option<(Address, u64, String)>,
    requests: Vec<String>,
}

pub struct DevnetProvider {
    chain: RefCell<Chain>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    data: Option<Bytes>,
}

#[derive(Debug, Deserialize)]
struct TxParams {
    from: Address,
    to: Address,
    data: Bytes,
}

impl DevnetProvider {
    pub fn new(account: Address) -> Self {
        Self::with_contract(account, WAVE_PORTAL_ADDRESS)
    }

    pub fn with_contract(account: Address, contract: Address) -> Self {
        Self {
            chain: RefCell::new(Chain {
                contract,
                account,
                authorized: false,
                prompts: 0,
                waves: Vec::new(),
                clock: 1_700_000_000,
                block_number: 1,
                nonce: 0,
                auto_mine: true,
                faults: Faults::default(),
                pending: Vec::new(),
                receipts: HashMap::new(),
                subscriptions: Vec::new(),
                next_subscription: 1,
                queued_logs: Vec::new(),
                hold_logs: false,
                during_history_read: None,
                requests: Vec::new(),
            }),
        }
    }

    pub fn preauthorize(&self) {
        self.chain.borrow_mut().authorized = true;
    }

    pub fn account(&self) -> Address {
        self.chain.borrow().account
    }

    /// Adds history that predates the session. No event is emitted.
    pub fn seed_wave(&self, waver: Address, timestamp: u64, message: &str) {
        self.chain.borrow_mut().waves.push(Wave {
            waver,
            message: message.to_owned(),
            timestamp: U256::from(timestamp),
        });
    }

    /// Another user waves: the wave is stored and `NewWave` is emitted.
    pub fn wave_from(&self, waver: Address, timestamp: u64, message: &str) {
        self.chain.borrow_mut().emit_wave(waver, timestamp, message);
        self.flush_logs();
    }

    /// The next `getAllWaves` call answers from the chain as it was, while
    /// this wave is mined and its event delivered before the answer arrives.
    pub fn wave_during_next_history_read(&self, waver: Address, timestamp: u64, message: &str) {
        self.chain.borrow_mut().during_history_read = Some((waver, timestamp, message.to_owned()));
    }

    pub fn set_clock(&self, unix_seconds: u64) {
        self.chain.borrow_mut().clock = unix_seconds;
    }

    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.chain.borrow_mut().auto_mine = auto_mine;
    }

    pub fn set_faults(&self, faults: Faults) {
        self.chain.borrow_mut().faults = faults;
    }

    pub fn mine(&self) -> usize {
        let count = {
            let mut chain = self.chain.borrow_mut();
            let (count, logs) = chain.mine_pending();
            chain.queued_logs.extend(logs);
            count
        };
        self.flush_logs();
        count
    }

    /// While held, emitted logs queue up instead of reaching subscribers.
    pub fn hold_logs(&self, hold: bool) {
        self.chain.borrow_mut().hold_logs = hold;
        if !hold {
            self.flush_logs();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.chain.borrow().pending.len()
    }

    pub fn prompt_count(&self) -> usize {
        self.chain.borrow().prompts
    }

    pub fn active_subscriptions(&self) -> usize {
        self.chain.borrow().subscriptions.len()
    }

    pub fn total_waves(&self) -> usize {
        self.chain.borrow().waves.len()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.chain
            .borrow()
            .requests
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    fn flush_logs(&self) {
        let logs = {
            let mut chain = self.chain.borrow_mut();
            if chain.hold_logs {
                return;
            }
            std::mem::take(&mut chain.queued_logs)
        };

        for log in logs {
            let listeners: Vec<LogListener> = {
                let chain = self.chain.borrow();
                chain
                    .subscriptions
                    .iter()
                    .filter(|sub| sub.matches(&log))
                    .map(|sub| sub.listener.clone())
                    .collect()
            };
            for listener in listeners {
                listener(log.clone());
            }
        }
    }

    fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let mut chain = self.chain.borrow_mut();
        chain.requests.push(method.to_owned());

        match method {
            "eth_accounts" => Ok(chain.authorized_accounts()),
            "eth_requestAccounts" => {
                chain.prompts += 1;
                if chain.faults.reject_connection {
                    return Err(RpcError::new(USER_REJECTED_CODE, "User rejected the request."));
                }
                chain.authorized = true;
                Ok(chain.authorized_accounts())
            }
            "eth_blockNumber" => Ok(json!(format!("{:#x}", chain.block_number))),
            "eth_call" => {
                if chain.faults.fail_reads {
                    return Err(RpcError::new(-32000, "header not found"));
                }
                chain.call(params).map_err(invalid_params)
            }
            "eth_sendTransaction" => chain.send_transaction(params),
            "eth_getTransactionReceipt" => {
                let hash = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_params(anyhow!("missing transaction hash")))?;
                Ok(chain.receipts.get(hash).cloned().unwrap_or(Value::Null))
            }
            other => Err(RpcError::new(-32601, format!("the method {other} does not exist"))),
        }
    }
}

impl Chain {
    fn authorized_accounts(&self) -> Value {
        if self.authorized {
            json!([self.account.to_checksum(None).to_lowercase()])
        } else {
            json!([])
        }
    }

    fn call(&mut self, params: &Value) -> Result<Value> {
        let call: CallParams =
            serde_json::from_value(params.get(0).cloned().unwrap_or(Value::Null))
                .context("eth_call expects a call object")?;

        // Calling an address without code returns empty data.
        if call.to != Some(self.contract) {
            return Ok(json!(Bytes::new()));
        }

        let data = call.data.unwrap_or_default();
        if data.len() < 4 {
            bail!("calldata shorter than a selector");
        }
        let selector: [u8; 4] = data[..4].try_into()?;

        let output = if selector == getTotalWavesCall::SELECTOR {
            getTotalWavesCall::abi_encode_returns(&(U256::from(self.waves.len()),))
        } else if selector == getAllWavesCall::SELECTOR {
            let output = getAllWavesCall::abi_encode_returns(&(self.waves.clone(),));
            if let Some((waver, timestamp, message)) = self.during_history_read.take() {
                self.emit_wave(waver, timestamp, &message);
            }
            output
        } else {
            bail!("unknown selector {}", hex::encode_prefixed(selector));
        };

        Ok(json!(Bytes::from(output)))
    }

    fn send_transaction(&mut self, params: &Value) -> Result<Value, RpcError> {
        let tx: TxParams = serde_json::from_value(params.get(0).cloned().unwrap_or(Value::Null))
            .map_err(|err| invalid_params(err.into()))?;

        if !self.authorized || tx.from != self.account {
            return Err(RpcError::new(
                4100,
                "The requested account and/or method has not been authorized by the user.",
            ));
        }
        if self.faults.reject_transactions {
            return Err(RpcError::new(
                USER_REJECTED_CODE,
                "MetaMask Tx Signature: User denied transaction signature.",
            ));
        }
        if tx.to != self.contract {
            return Err(invalid_params(anyhow!("no contract at {}", tx.to)));
        }
        if self.faults.revert_transactions {
            return Err(RpcError::new(3, "execution reverted"));
        }

        let call = waveCall::abi_decode(&tx.data, true)
            .map_err(|err| invalid_params(anyhow!("not a wave(string) call: {err}")))?;

        self.nonce += 1;
        let mut preimage = self.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(call._message.as_bytes());
        let hash = hex::encode_prefixed(keccak256(&preimage));

        debug!("devnet accepted {hash}");
        self.pending.push(PendingTx {
            hash: hash.clone(),
            from: tx.from,
            message: call._message,
        });

        if self.auto_mine {
            let (_, logs) = self.mine_pending();
            self.queued_logs.extend(logs);
        }

        Ok(json!(hash))
    }

    fn mine_pending(&mut self) -> (usize, Vec<Value>) {
        if self.pending.is_empty() {
            return (0, Vec::new());
        }

        self.block_number += 1;
        self.clock += 1;
        let block = format!("{:#x}", self.block_number);
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();
        let mut logs = Vec::new();

        for tx in pending {
            if self.faults.fail_mining {
                self.receipts.insert(
                    tx.hash.clone(),
                    json!({ "transactionHash": tx.hash, "blockNumber": block, "status": "0x0" }),
                );
                continue;
            }

            self.waves.push(Wave {
                waver: tx.from,
                message: tx.message.clone(),
                timestamp: U256::from(self.clock),
            });
            self.receipts.insert(
                tx.hash.clone(),
                json!({ "transactionHash": tx.hash, "blockNumber": block, "status": "0x1" }),
            );
            logs.push(self.new_wave_log(tx.from, self.clock, &tx.message, Some(&tx.hash)));
        }

        info!("devnet mined block {} with {count} transactions", self.block_number);
        (count, logs)
    }

    fn emit_wave(&mut self, waver: Address, timestamp: u64, message: &str) {
        self.block_number += 1;
        self.waves.push(Wave {
            waver,
            message: message.to_owned(),
            timestamp: U256::from(timestamp),
        });
        let log = self.new_wave_log(waver, timestamp, message, None);
        self.queued_logs.push(log);
    }

    fn new_wave_log(&self, from: Address, timestamp: u64, message: &str, tx_hash: Option<&str>) -> Value {
        let event = NewWave {
            from,
            timestamp: U256::from(timestamp),
            message: message.to_owned(),
        };
        let data = event.encode_log_data();
        json!({
            "address": self.contract,
            "topics": data.topics(),
            "data": data.data,
            "blockNumber": format!("{:#x}", self.block_number),
            "transactionHash": tx_hash,
        })
    }
}

impl LogSubscription {
    fn matches(&self, log: &Value) -> bool {
        let address_matches = log
            .get("address")
            .cloned()
            .and_then(|address| serde_json::from_value::<Address>(address).ok())
            == Some(self.address);
        let topic_matches = match self.topic {
            Some(topic) => log
                .get("topics")
                .and_then(|topics| topics.get(0))
                .cloned()
                .and_then(|topic0| serde_json::from_value::<B256>(topic0).ok())
                == Some(topic),
            None => true,
        };
        address_matches && topic_matches
    }
}

fn invalid_params(err: anyhow::Error) -> RpcError {
    RpcError::new(-32602, format!("invalid params: {err:#}"))
}

#[async_trait(?Send)]
impl Eip1193Provider for DevnetProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let result = self.dispatch(method, &params);
        self.flush_logs();
        result
    }

    async fn subscribe_logs(&self, filter: Value, listener: LogListener) -> Result<String, RpcError> {
        let mut chain = self.chain.borrow_mut();
        chain.requests.push("eth_subscribe".to_owned());

        let address = filter
            .get("address")
            .cloned()
            .and_then(|address| serde_json::from_value::<Address>(address).ok())
            .ok_or_else(|| invalid_params(anyhow!("log filter needs an address")))?;
        let topic = filter
            .get("topics")
            .and_then(|topics| topics.get(0))
            .cloned()
            .and_then(|topic| serde_json::from_value(topic).ok());

        let id = format!("{:#x}", chain.next_subscription);
        chain.next_subscription += 1;
        chain.subscriptions.push(LogSubscription {
            id: id.clone(),
            address,
            topic,
            listener,
        });
        Ok(id)
    }

    fn unsubscribe(&self, subscription_id: &str) {
        let mut chain = self.chain.borrow_mut();
        chain.requests.push("eth_unsubscribe".to_owned());
        chain.subscriptions.retain(|sub| sub.id != subscription_id);
    }
}
