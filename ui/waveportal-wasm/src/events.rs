//! Event binding.
//!
//! Every listener turns a DOM event into one controller intent. Async
//! intents are spawned via `wasm_bindgen_futures::spawn_local`.

use crate::dom::{self, Elements};
use std::rc::Rc;
use tracing::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wp_session::{SessionController, SessionError};

/// Attach `handler` to `event` on `$target` for the lifetime of the page.
macro_rules! listen {
    ($target:expr, $event:expr, $handler:expr) => {{
        let cb = Closure::wrap(Box::new($handler) as Box<dyn FnMut(web_sys::Event)>);
        $target.add_event_listener_with_callback($event, cb.as_ref().unchecked_ref())?;
        cb.forget();
    }};
}

/// Bind all UI event listeners. Call once after init.
pub fn bind_events(els: &Elements, controller: &Rc<SessionController>) -> Result<(), JsValue> {
    // ── Connect ──
    {
        let controller = Rc::clone(controller);
        listen!(els.connect_btn, "click", move |_: web_sys::Event| {
            let controller = Rc::clone(&controller);
            wasm_bindgen_futures::spawn_local(async move {
                on_connect(&controller).await;
            });
        });
    }

    // ── Draft ──
    {
        let controller = Rc::clone(controller);
        let textbox = els.textbox.clone();
        listen!(els.textbox, "input", move |_: web_sys::Event| {
            controller.update_draft(&textbox.value());
        });
    }

    // ── Wave ──
    {
        let controller = Rc::clone(controller);
        let textbox = els.textbox.clone();
        listen!(els.wave_form, "submit", move |event: web_sys::Event| {
            event.prevent_default();
            let message = textbox.value();
            let controller = Rc::clone(&controller);
            wasm_bindgen_futures::spawn_local(async move {
                if let Err(err) = controller.submit(&message).await {
                    warn!("wave not sent: {err}");
                }
            });
        });
    }

    Ok(())
}

async fn on_connect(controller: &SessionController) {
    match controller.connect().await {
        Ok(_) => {}
        Err(SessionError::NoProvider) => dom::alert("Get MetaMask!"),
        Err(err) => warn!("connect failed: {err}"),
    }
}

/// Release the live event subscription when the page is torn down.
pub fn dispose_on_pagehide(controller: &Rc<SessionController>) -> Result<(), JsValue> {
    let controller = Rc::clone(controller);
    let win = dom::window()?;
    listen!(win, "pagehide", move |_: web_sys::Event| {
        controller.dispose();
    });
    Ok(())
}
