use alloy_primitives::{Address, Bytes};
use serde::Deserialize;
use serde_json::{Value, json};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};
use wp_api_types::{RawWaveRecord, SessionError, WalletAddress};
use wp_provider::{Eip1193Provider, LogListener, RpcError, Signer};

use crate::abi::{self, InterfaceDescription};
use crate::subscription::Subscription;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub tx_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
}

/// How `await_mined` polls for a receipt. `max_attempts: None` waits forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolling {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(4_000),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

pub struct ContractHandle {
    address: Address,
    interface: &'static InterfaceDescription,
    signer: Signer,
}

impl ContractHandle {
    pub fn bind(address: Address, interface: &'static InterfaceDescription, signer: Signer) -> Self {
        Self {
            address,
            interface,
            signer,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn account(&self) -> Option<&WalletAddress> {
        self.signer.account.as_ref()
    }

    pub async fn read_total_waves(&self) -> Result<u64, SessionError> {
        let output = self.view_call(abi::encode_total_waves()).await?;
        abi::decode_total_waves(&output).map_err(|err| SessionError::Read(format!("{err:#}")))
    }

    pub async fn read_all_waves(&self) -> Result<Vec<RawWaveRecord>, SessionError> {
        let output = self.view_call(abi::encode_all_waves()).await?;
        abi::decode_all_waves(&output).map_err(|err| SessionError::Read(format!("{err:#}")))
    }

    pub async fn submit_wave(
        &self,
        message: &str,
        gas_limit: u64,
    ) -> Result<TransactionHandle, SessionError> {
        let provider = self.signer.provider.as_ref().ok_or(SessionError::NoProvider)?;
        let Some(from) = self.signer.account.as_ref() else {
            return Err(SessionError::Write(
                "contract is bound without a signing account".to_owned(),
            ));
        };

        let tx = json!([{
            "from": from.0,
            "to": self.address,
            "data": Bytes::from(abi::encode_wave(message)),
            "gas": format!("{gas_limit:#x}"),
        }]);

        let tx_hash = provider
            .request("eth_sendTransaction", tx)
            .await
            .map_err(write_error)?
            .as_str()
            .map(ToOwned::to_owned)
            .ok_or_else(|| SessionError::Write("eth_sendTransaction returned no hash".to_owned()))?;

        info!("Mining... {tx_hash}");
        Ok(TransactionHandle { tx_hash })
    }

    pub async fn await_mined(
        &self,
        tx: &TransactionHandle,
        polling: ReceiptPolling,
    ) -> Result<Receipt, SessionError> {
        let provider = self.signer.provider.as_ref().ok_or(SessionError::NoProvider)?;

        let mut attempts: u32 = 0;
        loop {
            let receipt = provider
                .request("eth_getTransactionReceipt", json!([tx.tx_hash]))
                .await
                .map_err(|err| SessionError::MiningFailed(err.to_string()))?;

            if !receipt.is_null() {
                let receipt: RpcReceipt = serde_json::from_value(receipt)
                    .map_err(|err| SessionError::MiningFailed(format!("malformed receipt: {err}")))?;
                if receipt.status.as_deref() == Some("0x0") {
                    return Err(SessionError::MiningFailed(format!(
                        "{} failed on-chain",
                        tx.tx_hash
                    )));
                }

                info!("Mined -- {}", tx.tx_hash);
                return Ok(Receipt {
                    tx_hash: tx.tx_hash.clone(),
                    block_number: receipt.block_number.as_deref().and_then(parse_quantity),
                });
            }

            attempts = attempts.saturating_add(1);
            if polling.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(SessionError::MiningFailed(format!(
                    "{} not mined after {attempts} receipt polls",
                    tx.tx_hash
                )));
            }
            debug!("receipt for {} not available yet", tx.tx_hash);
            self.signer.timer.sleep(polling.interval).await;
        }
    }

    /// Registers `on_event` for every `event_name` log the contract emits.
    /// Without a provider the returned subscription is inert.
    pub async fn subscribe<F>(&self, event_name: &str, on_event: F) -> Result<Subscription, SessionError>
    where
        F: Fn(RawWaveRecord) + 'static,
    {
        let Some(provider) = self.signer.provider.clone() else {
            debug!("no provider; {event_name} subscription is a no-op");
            return Ok(Subscription::inert());
        };

        let topic = self.interface.event_topic(event_name).ok_or_else(|| {
            SessionError::Read(format!("{} has no event {event_name}", self.interface.name))
        })?;

        let contract = self.address;
        let listener: LogListener = Rc::new(move |log: Value| match abi::decode_new_wave(&log, contract) {
            Ok(raw) => on_event(raw),
            Err(err) => warn!("ignoring log: {err:#}"),
        });

        let filter = json!({ "address": self.address, "topics": [topic] });
        let subscription_id = provider
            .subscribe_logs(filter, listener)
            .await
            .map_err(|err| SessionError::Read(err.to_string()))?;

        debug!("subscribed to {event_name} as {subscription_id}");
        Ok(Subscription::new(provider, subscription_id))
    }

    async fn view_call(&self, calldata: Vec<u8>) -> Result<Vec<u8>, SessionError> {
        let provider = self
            .signer
            .provider
            .as_ref()
            .ok_or_else(|| SessionError::Read("Ethereum object doesn't exist!".to_owned()))?;
        let output = view_request(provider, self.address, calldata)
            .await
            .map_err(|err| SessionError::Read(err.to_string()))?;
        serde_json::from_value::<Bytes>(output)
            .map(|bytes| bytes.to_vec())
            .map_err(|err| SessionError::Read(format!("eth_call returned non-hex data: {err}")))
    }
}

async fn view_request(
    provider: &Rc<dyn Eip1193Provider>,
    to: Address,
    calldata: Vec<u8>,
) -> Result<Value, RpcError> {
    let call = json!([{ "to": to, "data": Bytes::from(calldata) }, "latest"]);
    provider.request("eth_call", call).await
}

fn write_error(err: RpcError) -> SessionError {
    if err.is_user_rejection() {
        SessionError::UserRejected
    } else if err.is_revert() {
        SessionError::Reverted(err.message)
    } else {
        SessionError::Write(err.to_string())
    }
}

fn parse_quantity(value: &str) -> Option<u64> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16).ok()
}
