//! Snapshot → DOM.
//!
//! Pure projection of a `SessionSnapshot`; no session state is kept here.

use crate::dom::{self, Elements};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::warn;
use wasm_bindgen::JsValue;
use wp_session::{ConnectionState, SessionSnapshot, WaveRecord};

/// Remembers the wave list last put on the page; draft keystrokes leave it untouched.
#[derive(Default)]
pub struct Renderer {
    rendered_waves: RefCell<Option<Arc<Vec<WaveRecord>>>>,
}

impl Renderer {
    pub fn render(&self, els: &Elements, snapshot: &SessionSnapshot) {
        render_connection(els, snapshot.connection_state);
        render_form(els, snapshot);

        els.wave_count
            .set_text_content(Some(&snapshot.wave_count.to_string()));

        let items = &snapshot.waves.items;
        if !self.waves_changed(items) {
            return;
        }
        match render_waves(els, items.as_slice()) {
            Ok(()) => self.mark_rendered(items),
            Err(err) => warn!("failed to render waves: {err:?}"),
        }
    }

    fn waves_changed(&self, items: &Arc<Vec<WaveRecord>>) -> bool {
        !matches!(&*self.rendered_waves.borrow(), Some(last) if Arc::ptr_eq(last, items))
    }

    fn mark_rendered(&self, items: &Arc<Vec<WaveRecord>>) {
        *self.rendered_waves.borrow_mut() = Some(Arc::clone(items));
    }
}

fn render_connection(els: &Elements, state: ConnectionState) {
    let (label, dot) = match state {
        ConnectionState::Disconnected => ("Connect Wallet", "dot red"),
        ConnectionState::Connecting => ("Connecting...", "dot red"),
        ConnectionState::Connected | ConnectionState::Submitting => ("Connected", "dot green"),
    };
    els.connect_label.set_text_content(Some(label));
    els.connect_dot.set_class_name(dot);
    els.connect_btn.set_disabled(state == ConnectionState::Connecting);
}

fn render_form(els: &Elements, snapshot: &SessionSnapshot) {
    if els.textbox.value() != snapshot.draft {
        els.textbox.set_value(&snapshot.draft);
    }

    let annotated = match &snapshot.validation_error {
        Some(message) => els.input_container.set_attribute("data-error", message),
        None => els.input_container.remove_attribute("data-error"),
    };
    if let Err(err) = annotated {
        warn!("failed to update validation annotation: {err:?}");
    }
}

fn render_waves(els: &Elements, waves: &[WaveRecord]) -> Result<(), JsValue> {
    els.waves.set_inner_html("");
    for wave in waves {
        let card = wave_card(wave)?;
        els.waves.append_child(&card)?;
    }
    Ok(())
}

fn wave_card(wave: &WaveRecord) -> Result<web_sys::Element, JsValue> {
    let card = dom::create_element("div")?;
    card.set_class_name("wave");

    let address = dom::create_element("div")?;
    address.set_class_name("wave-address");
    address.set_text_content(Some(&format!("Address: {}", wave.sender_address)));

    let time = dom::create_element("div")?;
    time.set_class_name("wave-time");
    let date = js_sys::Date::new(&JsValue::from_f64(wave.timestamp_epoch_ms as f64));
    time.set_text_content(Some(&format!("Time: {}", String::from(date.to_string()))));

    let message = dom::create_element("div")?;
    message.set_class_name("wave-message");
    message.set_text_content(Some(&format!("Message: {}", wave.message)));

    card.append_child(&address)?;
    card.append_child(&time)?;
    card.append_child(&message)?;
    Ok(card)
}
