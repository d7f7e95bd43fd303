pub mod abi;
mod handle;
mod subscription;

pub use abi::{InterfaceDescription, WAVE_PORTAL_INTERFACE};
pub use alloy_primitives::{Address, address};
pub use handle::{ContractHandle, Receipt, ReceiptPolling, TransactionHandle};
pub use subscription::Subscription;

pub const WAVE_PORTAL_ADDRESS: Address = address!("A0D8fEB6d62f92D3deeF0EE4d08fb25EBDD22bc8");

/// Static gas ceiling for `wave(string)`.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

pub const NEW_WAVE_EVENT: &str = "NewWave";
