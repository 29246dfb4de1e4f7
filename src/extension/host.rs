//! Host functions visible to extension scripts
//!
//! `fetch(url, init)` performs an HTTP request on the gun's tokio runtime and
//! blocks the engine thread until the response body is read.
//! `measure(marker, body)` runs `body` inside its own shot, so one scenario
//! can time several steps. Both find their state in a slot local to the
//! engine thread.

use super::engine::describe;
use crate::channel::ResultSender;
use crate::error::{AppError, Result};
use crate::types::{NET_CODE_TIMED_OUT, NET_CODE_TRANSPORT_ERROR};
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// What a script can reach from inside its engine
#[derive(Debug, Clone)]
pub struct HostIo {
    runtime: Handle,
    client: reqwest::Client,
    results: ResultSender,
}

impl HostIo {
    /// Bind to the current tokio runtime; `timeout` bounds every `fetch`
    ///
    /// TLS certificates are not verified, as for the HTTP gun.
    pub fn new(results: ResultSender, timeout: Duration) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::internal(format!("Extension host needs a tokio runtime: {}", e)))?;
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(concat!("bfg-shooter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::gun_config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            runtime,
            client,
            results,
        })
    }
}

thread_local! {
    static HOST_IO: RefCell<Option<HostIo>> = const { RefCell::new(None) };
    static STEPS: Cell<u32> = const { Cell::new(0) };
}

/// Keeps `HostIo` installed on the engine thread while alive
pub(super) struct Installed(());

impl Drop for Installed {
    fn drop(&mut self) {
        // Releases the result sender before the thread is joined
        let _ = HOST_IO.try_with(|slot| slot.borrow_mut().take());
    }
}

pub(super) fn install(io: HostIo) -> Installed {
    HOST_IO.with(|slot| *slot.borrow_mut() = Some(io));
    Installed(())
}

/// Records emitted through `measure` since the last call
pub(super) fn take_steps() -> u32 {
    STEPS.with(|steps| steps.replace(0))
}

pub(super) fn register(context: &mut Context) -> JsResult<()> {
    context.register_global_callable(JsString::from("fetch"), 2, NativeFunction::from_fn_ptr(fetch))?;
    context.register_global_callable(JsString::from("measure"), 2, NativeFunction::from_fn_ptr(measure))?;
    Ok(())
}

fn host_io() -> JsResult<HostIo> {
    HOST_IO
        .with(|slot| slot.borrow().clone())
        .ok_or_else(|| JsNativeError::error().with_message("host I/O is not available").into())
}

fn string_arg(args: &[JsValue], index: usize, what: &str, context: &mut Context) -> JsResult<String> {
    match args.get(index) {
        Some(value) if value.is_string() => Ok(value.to_string(context)?.to_std_string_escaped()),
        _ => Err(JsNativeError::typ().with_message(format!("{} must be a string", what)).into()),
    }
}

/// `fetch(url, { method, headers, body })`
///
/// Returns `{ status, ok, body, proto_code, size_in, size_out }`, so the
/// response can be handed straight back to `measure`. Transport failures
/// throw a `TypeError` carrying the matching `net_code`.
fn fetch(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, "fetch: url", context)?;
    let init = match args.get(1) {
        Some(init) if !init.is_undefined() && !init.is_null() => init.to_json(context)?,
        _ => Value::Null,
    };

    let method_name = init.get("method").and_then(Value::as_str).unwrap_or("GET").to_uppercase();
    let method = reqwest::Method::from_bytes(method_name.as_bytes()).map_err(|_| {
        JsNativeError::typ().with_message(format!("fetch: invalid method '{}'", method_name))
    })?;
    let body = match init.get("body") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    };

    let io = host_io()?;
    let mut request = io.client.request(method, &url);
    if let Some(headers) = init.get("headers").and_then(Value::as_object) {
        for (name, value) in headers {
            let value = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            request = request.header(name.as_str(), value);
        }
    }
    let size_out = body.as_ref().map_or(0, String::len);
    if let Some(body) = body {
        request = request.body(body);
    }

    let (reply, response) = oneshot::channel();
    io.runtime.spawn(async move {
        let outcome = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                response.bytes().await.map(|body| (status, body))
            }
            Err(err) => Err(err),
        };
        let _ = reply.send(outcome);
    });

    let outcome = response
        .blocking_recv()
        .map_err(|_| JsNativeError::error().with_message("fetch: runtime stopped mid-request"))?;

    match outcome {
        Ok((status, body)) => {
            trace!(%url, status, size_in = body.len(), "fetch");
            let response = json!({
                "status": status,
                "ok": (200..300).contains(&status),
                "body": String::from_utf8_lossy(&body),
                "proto_code": status,
                "size_in": body.len(),
                "size_out": size_out,
            });
            JsValue::from_json(&response, context)
        }
        Err(err) => {
            debug!(%url, error = %err, "fetch failed");
            let net_code = if err.is_timeout() {
                NET_CODE_TIMED_OUT
            } else {
                NET_CODE_TRANSPORT_ERROR
            };
            let thrown: JsError = JsNativeError::typ()
                .with_message(format!("fetch failed: {}", err))
                .into();
            let thrown = thrown.to_opaque(context);
            if let Some(object) = thrown.as_object() {
                object.set(JsString::from("net_code"), net_code, false, context)?;
            }
            Err(JsError::from_opaque(thrown))
        }
    }
}

/// `net_code` attached to a thrown object, if any
fn thrown_net_code(err: &JsError, context: &mut Context) -> Option<i32> {
    let object = err.as_opaque()?.as_object()?.clone();
    let value = object.get(JsString::from("net_code"), context).ok()?;
    value.as_number().map(|code| code as i32)
}

/// `measure(marker, body)`
///
/// Emits one record tagged `marker`. An object returned by `body` overrides
/// record fields; a throw marks the record failed and is rethrown.
fn measure(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let marker = string_arg(args, 0, "measure: marker", context)?;
    let body = args
        .get(1)
        .and_then(JsValue::as_callable)
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("measure: body must be a function"))?;

    let io = host_io()?;
    STEPS.with(|steps| steps.set(steps.get() + 1));
    let mut shot = io.results.measure(&marker);

    match body.call(&JsValue::undefined(), &[], context) {
        Ok(value) => {
            if value.is_object() && !value.is_callable() {
                if let Ok(fields) = value.to_json(context) {
                    shot.apply_overrides(&fields);
                }
            }
            Ok(value)
        }
        Err(err) => {
            let net_code = thrown_net_code(&err, context);
            shot.fail(describe(err.clone(), context));
            if let Some(net_code) = net_code {
                shot.net_code = net_code;
            }
            Err(err)
        }
    }
}
