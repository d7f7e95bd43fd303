use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use wp_api_types::{SessionError, WalletAddress};

pub const USER_REJECTED_CODE: i64 = 4001;
pub const EXECUTION_REVERTED_CODE: i64 = 3;

pub type LogListener = Rc<dyn Fn(Value)>;

#[derive(Debug, Clone, Deserialize, PartialEq, Error)]
#[error("provider error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_CODE
    }

    pub fn is_revert(&self) -> bool {
        if self.code == EXECUTION_REVERTED_CODE || self.message.contains("execution reverted") {
            return true;
        }

        // MetaMask nests the node error under `data`.
        let Some(data) = self.data.as_ref() else {
            return false;
        };
        data.get("code").and_then(Value::as_i64) == Some(EXECUTION_REVERTED_CODE)
            || data
                .get("message")
                .and_then(Value::as_str)
                .is_some_and(|message| message.contains("revert"))
    }
}

#[async_trait(?Send)]
pub trait Eip1193Provider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// `eth_subscribe("logs", filter)`; every matching log is handed to `listener`.
    async fn subscribe_logs(&self, filter: Value, listener: LogListener) -> Result<String, RpcError>;

    /// Detach the listener and release the remote subscription without waiting.
    fn unsubscribe(&self, subscription_id: &str);
}

#[async_trait(?Send)]
pub trait Timer {
    async fn sleep(&self, duration: Duration);
}

#[cfg(feature = "tokio")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

#[cfg(feature = "tokio")]
#[async_trait(?Send)]
impl Timer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    pub address: Option<WalletAddress>,
    pub available: bool,
}

#[derive(Clone)]
pub struct Signer {
    pub provider: Option<Rc<dyn Eip1193Provider>>,
    pub timer: Rc<dyn Timer>,
    pub account: Option<WalletAddress>,
}

impl Signer {
    pub fn can_sign(&self) -> bool {
        self.provider.is_some() && self.account.is_some()
    }
}

pub struct ProviderGateway {
    provider: Option<Rc<dyn Eip1193Provider>>,
    timer: Rc<dyn Timer>,
    session: RefCell<WalletSession>,
}

impl ProviderGateway {
    pub fn new(provider: Option<Rc<dyn Eip1193Provider>>, timer: Rc<dyn Timer>) -> Self {
        Self {
            provider,
            timer,
            session: RefCell::new(WalletSession::default()),
        }
    }

    pub fn probe(&self) -> ProbeResult {
        if self.provider.is_some() {
            info!("We have the ethereum object");
        } else {
            warn!("Make sure you have metamask!");
        }
        ProbeResult {
            available: self.provider.is_some(),
        }
    }

    /// `eth_accounts`: already-authorized account, never prompts.
    pub async fn authorized_account(&self) -> Option<WalletAddress> {
        let provider = self.provider.as_ref()?;

        let accounts = match provider.request("eth_accounts", json!([])).await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!("eth_accounts failed: {err}");
                return None;
            }
        };

        match first_account(&accounts) {
            Some(account) => {
                info!("Found an authorized account: {account}");
                self.remember(&account);
                Some(account)
            }
            None => {
                info!("No authorized account found");
                None
            }
        }
    }

    /// `eth_requestAccounts`: prompts the user.
    pub async fn request_connection(&self) -> Result<WalletAddress, SessionError> {
        let Some(provider) = self.provider.as_ref() else {
            return Err(SessionError::NoProvider);
        };

        let accounts = provider
            .request("eth_requestAccounts", json!([]))
            .await
            .map_err(|err| {
                if err.is_user_rejection() {
                    return SessionError::UserRejected;
                }
                warn!(code = err.code, "eth_requestAccounts failed: {}", err.message);
                SessionError::Connection(err.to_string())
            })?;

        let account = first_account(&accounts)
            .ok_or_else(|| SessionError::Connection("provider returned no accounts".to_owned()))?;
        info!("Connected {account}");
        self.remember(&account);
        Ok(account)
    }

    pub fn session(&self) -> WalletSession {
        self.session.borrow().clone()
    }

    pub fn provider(&self) -> Option<Rc<dyn Eip1193Provider>> {
        self.provider.clone()
    }

    pub fn signer(&self) -> Signer {
        Signer {
            provider: self.provider.clone(),
            timer: self.timer.clone(),
            account: self.session.borrow().address.clone(),
        }
    }

    fn remember(&self, account: &WalletAddress) {
        let mut session = self.session.borrow_mut();
        session.address = Some(account.clone());
        session.available = true;
    }
}

fn first_account(accounts: &Value) -> Option<WalletAddress> {
    accounts
        .as_array()?
        .first()?
        .as_str()
        .map(|account| WalletAddress(account.to_owned()))
}
