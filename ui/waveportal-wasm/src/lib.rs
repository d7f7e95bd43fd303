//! WavePortal WASM Frontend
//!
//! Thin view over `wp-session`: binds `window.ethereum`, renders session
//! snapshots into the page and forwards user intents to the controller.

pub mod dom;
pub mod ethereum;
pub mod events;
pub mod logging;
pub mod render;
pub mod state;
pub mod timer;

use std::rc::Rc;
use tracing::info;
use wasm_bindgen::prelude::*;
use wp_devnet::DevnetProvider;
use wp_provider::{Eip1193Provider, ProviderGateway};
use wp_session::{SessionConfig, SessionController};

/// Account used by the in-page devnet.
const DEMO_ACCOUNT: wp_contract::Address =
    wp_contract::address!("00000000000000000000000000000000000a11ce");

/// WASM entry point – called automatically when the module is instantiated.
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    // Improve panic messages in the browser console
    console_error_panic_hook::set_once();
    logging::init();

    init().await
}

/// Mount sequence: bind elements, build the session, render, then try a silent restore.
async fn init() -> Result<(), JsValue> {
    let els = dom::Elements::bind()?;

    let config = SessionConfig::from_lookup(state::local_get);
    let gateway = ProviderGateway::new(select_provider(&config), Rc::new(timer::GlooTimer));
    let controller = Rc::new(SessionController::new(gateway, config));

    let renderer = Rc::new(render::Renderer::default());
    renderer.render(&els, &controller.snapshot());
    {
        let els = els.clone();
        let renderer = Rc::clone(&renderer);
        controller.observe(move |snapshot| renderer.render(&els, snapshot));
    }

    events::bind_events(&els, &controller)?;
    events::dispose_on_pagehide(&controller)?;

    controller.restore().await;
    Ok(())
}

/// `window.ethereum` when present. Otherwise the in-page devnet if the
/// `WAVEPORTAL_DEVNET` flag is set in localStorage.
fn select_provider(config: &SessionConfig) -> Option<Rc<dyn Eip1193Provider>> {
    if let Some(browser) = ethereum::BrowserProvider::detect() {
        return Some(Rc::new(browser));
    }

    if state::local_get(state::DEVNET_FLAG_KEY).as_deref() == Some("1") {
        info!("no injected wallet; using in-page devnet");
        let devnet = DevnetProvider::with_contract(DEMO_ACCOUNT, config.contract_address);
        devnet.seed_wave(DEMO_ACCOUNT, js_sys::Date::now() as u64 / 1000, "gm from the devnet");
        return Some(Rc::new(devnet));
    }

    None
}
