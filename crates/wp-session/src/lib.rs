mod config;
mod controller;

pub use config::{
    CONTRACT_ADDRESS_KEY, DEDUP_WINDOW_KEY, GAS_LIMIT_KEY, MAX_RECEIPT_POLLS_KEY,
    RECEIPT_POLL_MS_KEY, SessionConfig,
};
pub use controller::{ObserverId, SessionController, SessionSnapshot};
pub use wp_api_types::{ConnectionState, SessionError, WaveRecord};
pub use wp_wave_log::{DedupPolicy, WaveLogSnapshot};
