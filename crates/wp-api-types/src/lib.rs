use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const EMPTY_MESSAGE_ERROR: &str = "Message can not be empty ):";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WalletAddress(pub String);

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawWaveRecord {
    pub waver: String,
    pub timestamp: u64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WaveRecord {
    pub sender_address: String,
    pub timestamp_epoch_ms: u128,
    pub message: String,
}

impl From<RawWaveRecord> for WaveRecord {
    fn from(raw: RawWaveRecord) -> Self {
        Self {
            sender_address: raw.waver,
            timestamp_epoch_ms: u128::from(raw.timestamp) * 1000,
            message: raw.message,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connected with at least one wave transaction in flight.
    Submitting,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Submitting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet provider found; install MetaMask")]
    NoProvider,
    #[error("request rejected by user")]
    UserRejected,
    #[error("wallet connection failed: {0}")]
    Connection(String),
    #[error("contract read failed: {0}")]
    Read(String),
    #[error("contract write failed: {0}")]
    Write(String),
    #[error("transaction reverted: {0}")]
    Reverted(String),
    #[error("transaction not mined: {0}")]
    MiningFailed(String),
    #[error("{0}")]
    Validation(String),
}

impl SessionError {
    pub fn empty_message() -> Self {
        Self::Validation(EMPTY_MESSAGE_ERROR.to_owned())
    }
}
