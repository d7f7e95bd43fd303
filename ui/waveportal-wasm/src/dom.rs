//! DOM element bindings.
//!
//! All fields are resolved once at startup. A missing element aborts `init`.

use wasm_bindgen::prelude::*;
use web_sys::{Document, Element, HtmlButtonElement, HtmlTextAreaElement, Window};

// ── Helpers ──

pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("no window"))
}

pub fn doc() -> Result<Document, JsValue> {
    window()?
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))
}

pub fn by_id(id: &str) -> Result<Element, JsValue> {
    doc()?
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("missing element #{id}")))
}

pub fn by_id_typed<T: JsCast>(id: &str) -> Result<T, JsValue> {
    by_id(id)?
        .dyn_into::<T>()
        .map_err(|_| JsValue::from_str(&format!("element #{id} has an unexpected type")))
}

pub fn query(selector: &str) -> Result<Element, JsValue> {
    doc()?
        .query_selector(selector)?
        .ok_or_else(|| JsValue::from_str(&format!("missing element {selector}")))
}

pub fn create_element(tag: &str) -> Result<Element, JsValue> {
    doc()?.create_element(tag)
}

pub fn alert(message: &str) {
    if let Ok(win) = window() {
        let _ = win.alert_with_message(message);
    }
}

/// Resolved handles for every element the page renders into.
#[derive(Clone)]
pub struct Elements {
    pub connect_btn: HtmlButtonElement,
    pub connect_dot: Element,
    pub connect_label: Element,
    pub wave_form: Element,
    pub textbox: HtmlTextAreaElement,
    pub input_container: Element,
    pub wave_count: Element,
    pub waves: Element,
}

impl Elements {
    pub fn bind() -> Result<Self, JsValue> {
        Ok(Self {
            connect_btn: by_id_typed("connectWallet")?,
            connect_dot: query("#connectWallet .dot")?,
            connect_label: query("#connectWallet .label")?,
            wave_form: by_id("waveForm")?,
            textbox: by_id_typed("textbox")?,
            input_container: query(".input-container")?,
            wave_count: by_id("waveCount")?,
            waves: by_id("waves")?,
        })
    }
}
