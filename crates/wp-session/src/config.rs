use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use wp_contract::{Address, DEFAULT_GAS_LIMIT, ReceiptPolling, WAVE_PORTAL_ADDRESS};
use wp_wave_log::DedupPolicy;

pub const CONTRACT_ADDRESS_KEY: &str = "WAVEPORTAL_CONTRACT_ADDRESS";
pub const GAS_LIMIT_KEY: &str = "WAVEPORTAL_GAS_LIMIT";
pub const RECEIPT_POLL_MS_KEY: &str = "WAVEPORTAL_RECEIPT_POLL_MS";
pub const MAX_RECEIPT_POLLS_KEY: &str = "WAVEPORTAL_MAX_RECEIPT_POLLS";
pub const DEDUP_WINDOW_KEY: &str = "WAVEPORTAL_DEDUP_WINDOW";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub contract_address: Address,
    pub gas_limit: u64,
    pub receipt_polling: ReceiptPolling,
    pub dedup: DedupPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            contract_address: WAVE_PORTAL_ADDRESS,
            gas_limit: DEFAULT_GAS_LIMIT,
            receipt_polling: ReceiptPolling::default(),
            dedup: DedupPolicy::Disabled,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `WAVEPORTAL_*` key.
    /// Unparsable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(address) = parse_override::<Address>(&lookup, CONTRACT_ADDRESS_KEY) {
            config.contract_address = address;
        }
        if let Some(gas_limit) = parse_override::<u64>(&lookup, GAS_LIMIT_KEY) {
            config.gas_limit = gas_limit;
        }
        if let Some(ms) = parse_override::<u64>(&lookup, RECEIPT_POLL_MS_KEY) {
            config.receipt_polling.interval = Duration::from_millis(ms);
        }
        if let Some(max) = parse_override::<u32>(&lookup, MAX_RECEIPT_POLLS_KEY) {
            config.receipt_polling.max_attempts = (max > 0).then_some(max);
        }
        if let Some(window) = parse_override::<usize>(&lookup, DEDUP_WINDOW_KEY) {
            config.dedup = if window == 0 {
                DedupPolicy::Disabled
            } else {
                DedupPolicy::TailWindow(window)
            };
        }

        config
    }
}

fn parse_override<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(err) => {
            warn!("ignoring {key}={raw}: {err}");
            None
        }
    }
}
