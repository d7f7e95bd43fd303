//! `window.ethereum` as an [`Eip1193Provider`].
//!
//! Direct JavaScript interop through the Reflect API. Log subscriptions ride
//! on the provider's `message` event, filtered per subscription id.

use async_trait::async_trait;
use js_sys::{Function, Object, Promise, Reflect};
use serde::Serialize;
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::HashMap;
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::Closure;
use wasm_bindgen_futures::JsFuture;
use wp_provider::{Eip1193Provider, LogListener, RpcError};

type MessageClosure = Closure<dyn Fn(JsValue)>;

pub struct BrowserProvider {
    ethereum: Object,
    listeners: RefCell<HashMap<String, MessageClosure>>,
}

impl BrowserProvider {
    /// `None` when no wallet injected `window.ethereum`.
    pub fn detect() -> Option<Self> {
        let window = web_sys::window()?;
        let ethereum = Reflect::get(&window, &"ethereum".into())
            .ok()
            .and_then(|v| v.dyn_into::<Object>().ok())?;
        Some(Self {
            ethereum,
            listeners: RefCell::new(HashMap::new()),
        })
    }

    fn method(&self, name: &str) -> Result<Function, RpcError> {
        Reflect::get(&self.ethereum, &name.into())
            .ok()
            .and_then(|v| v.dyn_into::<Function>().ok())
            .ok_or_else(|| RpcError::internal(format!("ethereum.{name} is not a function")))
    }
}

#[async_trait(?Send)]
impl Eip1193Provider for BrowserProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        call(&self.ethereum, method, params).await
    }

    async fn subscribe_logs(&self, filter: Value, listener: LogListener) -> Result<String, RpcError> {
        let id = call(&self.ethereum, "eth_subscribe", json!(["logs", filter]))
            .await?
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| RpcError::internal("eth_subscribe returned no id"))?;

        let expected = id.clone();
        let closure = Closure::wrap(Box::new(move |message: JsValue| {
            let Ok(message) = serde_wasm_bindgen::from_value::<Value>(message) else {
                return;
            };
            if message.get("type").and_then(Value::as_str) != Some("eth_subscription") {
                return;
            }
            let Some(data) = message.get("data") else {
                return;
            };
            if data.get("subscription").and_then(Value::as_str) != Some(expected.as_str()) {
                return;
            }
            if let Some(result) = data.get("result") {
                listener(result.clone());
            }
        }) as Box<dyn Fn(JsValue)>);

        self.method("on")?
            .call2(&self.ethereum, &"message".into(), closure.as_ref())
            .map_err(rpc_error)?;

        debug!(subscription = %id, "log subscription opened");
        self.listeners.borrow_mut().insert(id.clone(), closure);
        Ok(id)
    }

    fn unsubscribe(&self, subscription_id: &str) {
        let Some(closure) = self.listeners.borrow_mut().remove(subscription_id) else {
            return;
        };

        match self.method("removeListener") {
            Ok(remove) => {
                if let Err(err) = remove.call2(&self.ethereum, &"message".into(), closure.as_ref()) {
                    warn!("removeListener failed: {err:?}");
                }
            }
            Err(err) => warn!("{err}"),
        }

        let ethereum = self.ethereum.clone();
        let id = subscription_id.to_owned();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(err) = call(&ethereum, "eth_unsubscribe", json!([id])).await {
                warn!("eth_unsubscribe failed: {err}");
            }
        });
    }
}

/// `ethereum.request({ method, params })`.
async fn call(ethereum: &Object, method: &str, params: Value) -> Result<Value, RpcError> {
    let args = Object::new();
    let params = params
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| RpcError::internal(e.to_string()))?;
    Reflect::set(&args, &"method".into(), &method.into()).map_err(rpc_error)?;
    Reflect::set(&args, &"params".into(), &params).map_err(rpc_error)?;

    let request = Reflect::get(ethereum, &"request".into())
        .ok()
        .and_then(|v| v.dyn_into::<Function>().ok())
        .ok_or_else(|| RpcError::internal("ethereum.request is not a function"))?;

    let promise: Promise = request.call1(ethereum, &args).map_err(rpc_error)?.into();
    let result = JsFuture::from(promise).await.map_err(rpc_error)?;

    if result.is_undefined() || result.is_null() {
        return Ok(Value::Null);
    }
    serde_wasm_bindgen::from_value(result).map_err(|e| RpcError::internal(e.to_string()))
}

/// Provider errors are usually `Error` instances whose `message` is not
/// enumerable, so the fields are read one by one.
fn rpc_error(err: JsValue) -> RpcError {
    let code = Reflect::get(&err, &"code".into())
        .ok()
        .and_then(|v| v.as_f64())
        .map(|c| c as i64);
    let message = Reflect::get(&err, &"message".into())
        .ok()
        .and_then(|v| v.as_string())
        .or_else(|| err.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    let data = Reflect::get(&err, &"data".into())
        .ok()
        .filter(|v| !v.is_undefined())
        .and_then(|v| serde_wasm_bindgen::from_value::<Value>(v).ok());

    let mut error = match code {
        Some(code) => RpcError::new(code, message),
        None => RpcError::internal(message),
    };
    error.data = data;
    error
}
