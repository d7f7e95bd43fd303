//! localStorage helpers.
//!
//! Session state lives in the controller; the browser only keeps optional
//! `WAVEPORTAL_*` configuration overrides here.

pub const DEVNET_FLAG_KEY: &str = "WAVEPORTAL_DEVNET";

fn storage() -> Option<web_sys::Storage> {
    web_sys::window()?.local_storage().ok()?
}

pub fn local_get(key: &str) -> Option<String> {
    storage()?.get_item(key).ok()?
}
