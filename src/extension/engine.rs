//! Engine thread: owns the boa context of one unit

use super::host::{self, HostIo};
use super::{Call, ExtensionShape, ExtensionSpec, Invocation, Request};
use crate::error::{AppError, Result};
use boa_engine::{Context, JsError, JsObject, JsString, JsValue, Source};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Class members that are never dispatched as scenarios
const RESERVED_METHODS: [&str; 3] = ["constructor", "setup", "teardown"];

pub(super) fn run(
    source: String,
    spec: ExtensionSpec,
    io: HostIo,
    ready: oneshot::Sender<Result<()>>,
    mut requests: mpsc::UnboundedReceiver<Request>,
) {
    let _io = host::install(io);
    let mut engine = match Engine::load(&source, spec) {
        Ok(engine) => {
            let _ = ready.send(Ok(()));
            engine
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    while let Some(request) = requests.blocking_recv() {
        match request {
            Request::Init { options, reply } => {
                let _ = reply.send(engine.init(&options));
            }
            Request::Setup { param, reply } => {
                let _ = reply.send(engine.setup(&param));
            }
            Request::Teardown { reply } => {
                let _ = reply.send(engine.teardown());
            }
            Request::Call { target, payload, marker, reply } => {
                let _ = reply.send(engine.call(&target, &payload, &marker));
            }
        }
    }

    debug!(identity = %engine.spec.identity, "Engine thread finished");
}

struct Engine {
    context: Context,
    spec: ExtensionSpec,
    /// `shoot`, `SCENARIOS` or the class constructor, depending on shape
    entry: JsObject,
    /// Class instance, once constructed
    instance: Option<JsObject>,
}

impl Engine {
    fn load(source: &str, spec: ExtensionSpec) -> Result<Self> {
        let mut context = Context::default();
        host::register(&mut context).map_err(|e| {
            AppError::extension_load(format!("Failed to register host functions: {}", e))
        })?;
        context.eval(Source::from_bytes(source)).map_err(|e| {
            AppError::extension_load(format!("Failed to evaluate '{}' module: {}", spec.unit_name, e))
        })?;

        let (kind, symbol) = spec.shape.required_symbol();
        let found = lookup(&mut context, symbol)?;
        let entry = match (&spec.shape, found) {
            (ExtensionShape::Function, Some(obj)) if obj.is_callable() => obj,
            (ExtensionShape::ScenarioTable, Some(obj)) => obj,
            (ExtensionShape::Class { .. }, Some(obj)) if obj.is_constructor() => obj,
            _ => {
                return Err(AppError::extension_load(format!(
                    "{} '{}' was not found in '{}' module",
                    kind, symbol, spec.unit_name
                )));
            }
        };

        Ok(Self {
            context,
            spec,
            entry,
            instance: None,
        })
    }

    fn init(&mut self, options: &serde_json::Value) -> Result<()> {
        let options = JsValue::from_json(options, &mut self.context)
            .map_err(|e| AppError::extension(format!("Failed to convert options: {}", e)))?;

        match &self.spec.shape {
            ExtensionShape::Class { class_name } => {
                let instance = self
                    .entry
                    .construct(&[options], None, &mut self.context)
                    .map_err(|e| {
                        AppError::extension_load(format!(
                            "Failed to construct '{}': {}",
                            class_name,
                            describe(e, &mut self.context)
                        ))
                    })?;
                self.instance = Some(instance);
            }
            ExtensionShape::Function | ExtensionShape::ScenarioTable => {
                match lookup(&mut self.context, "init")? {
                    Some(init) if init.is_callable() => {
                        init.call(&JsValue::undefined(), &[options], &mut self.context)
                            .map_err(|e| {
                                AppError::extension(format!(
                                    "init failed: {}",
                                    describe(e, &mut self.context)
                                ))
                            })?;
                    }
                    _ => trace!(unit = %self.spec.unit_name, "No init function"),
                }
            }
        }
        Ok(())
    }

    fn setup(&mut self, param: &str) -> Result<()> {
        self.call_instance_hook("setup", &[JsValue::from(JsString::from(param))])
    }

    fn teardown(&mut self) -> Result<()> {
        self.call_instance_hook("teardown", &[])
    }

    fn call_instance_hook(&mut self, name: &str, args: &[JsValue]) -> Result<()> {
        let Some(instance) = self.instance.clone() else {
            return Ok(());
        };
        if let Some(hook) = method(&instance, name, &mut self.context)? {
            hook.call(&JsValue::from(instance), args, &mut self.context)
                .map_err(|e| {
                    AppError::extension(format!("{} failed: {}", name, describe(e, &mut self.context)))
                })?;
        }
        Ok(())
    }

    /// Run `target`; only the script's own run time is measured
    fn call(&mut self, target: &str, payload: &str, marker: &str) -> Call {
        let started = Instant::now();
        host::take_steps();
        let invocation = self.invoke(target, payload, marker);
        Call {
            invocation,
            elapsed: started.elapsed(),
            steps: host::take_steps(),
        }
    }

    fn invoke(&mut self, target: &str, payload: &str, marker: &str) -> Result<Invocation> {
        let payload = JsValue::from(JsString::from(payload));
        let marker = JsValue::from(JsString::from(marker));

        let (this, function, args) = match &self.spec.shape {
            ExtensionShape::Function => {
                (JsValue::undefined(), Some(self.entry.clone()), vec![payload, marker])
            }
            ExtensionShape::ScenarioTable => {
                let table = self.entry.clone();
                let function = scenario_method(&table, target, &mut self.context)?;
                (JsValue::undefined(), function, vec![payload, marker])
            }
            ExtensionShape::Class { class_name } => {
                let instance = self.instance.clone().ok_or_else(|| {
                    AppError::extension(format!("'{}' has not been constructed", class_name))
                })?;
                let function = if RESERVED_METHODS.contains(&target) {
                    None
                } else {
                    scenario_method(&instance, target, &mut self.context)?
                };
                (JsValue::from(instance), function, vec![payload, marker])
            }
        };

        let Some(function) = function else {
            return Ok(Invocation::NotFound);
        };

        let value = function
            .call(&this, &args, &mut self.context)
            .map_err(|e| AppError::extension(format!("{}: {}", target, describe(e, &mut self.context))))?;

        Ok(Invocation::Completed(to_json(&value, &mut self.context)))
    }
}

/// Resolve a global binding, including `let`/`class` declarations
fn lookup(context: &mut Context, name: &str) -> Result<Option<JsObject>> {
    if !super::is_identifier(name) {
        return Ok(None);
    }
    let expr = format!("typeof {name} === 'undefined' ? undefined : {name}");
    let value = context
        .eval(Source::from_bytes(&expr))
        .map_err(|e| AppError::extension(format!("Failed to resolve '{}': {}", name, e)))?;
    Ok(value.as_object().cloned())
}

/// Callable property `name` of `object`, if any
fn method(object: &JsObject, name: &str, context: &mut Context) -> Result<Option<JsObject>> {
    let value = object
        .get(JsString::from(name), context)
        .map_err(|e| AppError::extension(format!("Failed to read '{}': {}", name, e)))?;
    Ok(value.as_callable().cloned())
}

/// Callable `name` defined by the script on `object` or its own prototypes
///
/// The lookup stops at `Object.prototype`, so built-ins such as `toString`
/// or `constructor` of a plain object never match.
fn scenario_method(object: &JsObject, name: &str, context: &mut Context) -> Result<Option<JsObject>> {
    let key = JsString::from(name);
    let root = context.intrinsics().constructors().object().prototype();
    let mut current = Some(object.clone());

    while let Some(candidate) = current {
        if JsObject::equals(&candidate, &root) {
            break;
        }
        let owned = candidate
            .has_own_property(key.clone(), context)
            .map_err(|e| AppError::extension(format!("Failed to read '{}': {}", name, e)))?;
        if owned {
            return method(&candidate, name, context);
        }
        current = candidate.prototype();
    }
    Ok(None)
}

/// Message of a thrown value, preferring the native error message
pub(super) fn describe(err: JsError, context: &mut Context) -> String {
    match err.try_native(context) {
        Ok(native) => native.to_string(),
        Err(_) => err.to_string(),
    }
}

fn to_json(value: &JsValue, context: &mut Context) -> Option<serde_json::Value> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    match value.to_json(context) {
        Ok(json) => Some(json),
        Err(e) => {
            trace!(error = %e, "Return value is not JSON-representable");
            None
        }
    }
}
