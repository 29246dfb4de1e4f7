//! Dynamic extension loader
//!
//! User gun code is JavaScript evaluated by an embedded boa engine. The
//! engine context is not `Send`, so each loaded unit lives on its own OS
//! thread; async callers talk to it over a channel and wait for replies on
//! oneshot channels. Calls into one unit are therefore serialized.
//!
//! Scripts reach their target through the host functions `fetch` and
//! `measure` (see [`HostIo`]).

mod engine;
mod host;

pub use host::HostIo;

use crate::error::{AppError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier regex"));

/// What a unit must export
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionShape {
    /// A global function `shoot(payload, marker)`
    Function,
    /// A global object `SCENARIOS` mapping names to `(payload, marker)` functions
    ScenarioTable,
    /// A class whose instances expose one method per scenario
    Class { class_name: String },
}

impl ExtensionShape {
    fn required_symbol(&self) -> (&'static str, &str) {
        match self {
            ExtensionShape::Function => ("function", "shoot"),
            ExtensionShape::ScenarioTable => ("object", "SCENARIOS"),
            ExtensionShape::Class { class_name } => ("class", class_name.as_str()),
        }
    }
}

/// Everything needed to load one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSpec {
    /// Script file
    pub path: PathBuf,
    /// Name used in error messages
    pub unit_name: String,
    /// Per-load identity used for the engine thread and logs
    pub identity: String,
    pub shape: ExtensionShape,
}

/// Result of calling into a unit
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The target ran; its return value if it was JSON-representable
    Completed(Option<serde_json::Value>),
    /// No callable with that name
    NotFound,
}

/// One call as seen by the engine thread
#[derive(Debug)]
pub struct Call {
    /// What the target did; a throw is an `Extension` error
    pub invocation: Result<Invocation>,
    /// Time the target ran, not counting the wait for the engine thread
    pub elapsed: Duration,
    /// Records the target emitted itself through `measure`
    pub steps: u32,
}

impl Call {
    /// `elapsed` in microseconds
    pub fn elapsed_us(&self) -> u64 {
        u64::try_from(self.elapsed.as_micros()).unwrap_or(u64::MAX)
    }
}

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Request {
    Init { options: serde_json::Value, reply: Reply<()> },
    Setup { param: String, reply: Reply<()> },
    Teardown { reply: Reply<()> },
    Call { target: String, payload: String, marker: String, reply: oneshot::Sender<Call> },
}

/// Whether `name` can be used as a bare JavaScript identifier
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// File of module `module_name` under `module_path`, `.js` appended when bare
pub fn resolve_module_file(module_path: &Path, module_name: &str) -> PathBuf {
    let file = module_path.join(module_name);
    if file.extension().is_some() {
        file
    } else {
        file.with_extension("js")
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a loaded unit running on its engine thread
#[derive(Debug)]
pub struct ExtensionHost {
    identity: String,
    unit_name: String,
    requests: Mutex<Option<mpsc::UnboundedSender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExtensionHost {
    /// Read and evaluate the unit, checking that its required symbol exists
    ///
    /// `io` backs the script's `fetch` and `measure` functions.
    pub async fn load(spec: ExtensionSpec, io: HostIo) -> Result<Self> {
        let (kind, symbol) = spec.shape.required_symbol();
        if !is_identifier(symbol) {
            return Err(AppError::extension_load(format!(
                "Invalid {} name '{}' for '{}' module",
                kind, symbol, spec.unit_name
            )));
        }

        let source = tokio::fs::read_to_string(&spec.path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::extension_load(format!("Extension file not found: {}", spec.path.display()))
            } else {
                AppError::extension_load(format!(
                    "Failed to read extension file {}: {}",
                    spec.path.display(),
                    e
                ))
            }
        })?;

        let identity = spec.identity.clone();
        let unit_name = spec.unit_name.clone();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let worker = std::thread::Builder::new()
            .name(format!("ext-{}", identity))
            .spawn(move || engine::run(source, spec, io, ready_tx, request_rx))
            .map_err(|e| AppError::extension_load(format!("Failed to start engine thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = tokio::task::spawn_blocking(move || worker.join()).await;
                return Err(err);
            }
            Err(_) => {
                return Err(AppError::extension_load(format!(
                    "Engine thread for '{}' exited during load",
                    unit_name
                )));
            }
        }

        info!(unit = %unit_name, %identity, "Extension loaded");
        Ok(Self {
            identity,
            unit_name,
            requests: Mutex::new(Some(request_tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Per-load identity
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unit name
    pub fn unit_name(&self) -> &str {
        &self.unit_name
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        {
            let requests = lock(&self.requests);
            let sender = requests.as_ref().ok_or_else(|| {
                AppError::extension(format!("Extension '{}' is shut down", self.identity))
            })?;
            sender.send(build(reply_tx)).map_err(|_| {
                AppError::extension(format!("Engine thread for '{}' is gone", self.identity))
            })?;
        }
        reply_rx.await.map_err(|_| {
            AppError::extension(format!("Engine thread for '{}' stopped mid-call", self.identity))
        })
    }

    /// Run the unit's initializer with the gun options
    ///
    /// Functions and scenario tables call an optional global `init(options)`;
    /// classes are instantiated with `options` as the constructor argument.
    pub async fn init_hook(&self, options: serde_json::Value) -> Result<()> {
        self.request(|reply| Request::Init { options, reply }).await?
    }

    /// Call the instance's optional `setup(init_param)`
    pub async fn setup_hook(&self, init_param: &str) -> Result<()> {
        let param = init_param.to_string();
        self.request(|reply| Request::Setup { param, reply }).await?
    }

    /// Call the instance's optional `teardown()`
    pub async fn teardown_hook(&self) -> Result<()> {
        self.request(|reply| Request::Teardown { reply }).await?
    }

    /// Call `target` with the missile
    ///
    /// The outer error means the engine could not be reached; what the
    /// script itself did is in [`Call::invocation`].
    pub async fn call(&self, target: &str, payload: &str, marker: &str) -> Result<Call> {
        let target = target.to_string();
        let payload = payload.to_string();
        let marker = marker.to_string();
        self.request(|reply| Request::Call { target, payload, marker, reply }).await
    }

    /// Stop the engine thread and wait for it; safe to call twice
    pub async fn shutdown(&self) -> Result<()> {
        drop(lock(&self.requests).take());
        let worker = lock(&self.worker).take();

        if let Some(worker) = worker {
            let joined = tokio::task::spawn_blocking(move || worker.join())
                .await
                .map_err(|e| AppError::internal(format!("Failed to join engine thread: {}", e)))?;
            if joined.is_err() {
                return Err(AppError::extension(format!(
                    "Engine thread for '{}' panicked",
                    self.identity
                )));
            }
            debug!(identity = %self.identity, "Extension shut down");
        }
        Ok(())
    }
}

impl Drop for ExtensionHost {
    fn drop(&mut self) {
        // Closing the channel lets the thread finish on its own
        drop(lock(&self.requests).take());
    }
}

/// Slot holding the host of a gun between setup and teardown
#[derive(Debug, Default)]
pub struct ExtensionSlot {
    host: Mutex<Option<Arc<ExtensionHost>>>,
}

impl ExtensionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly loaded host, returning the one it replaces
    pub fn install(&self, host: ExtensionHost) -> Option<Arc<ExtensionHost>> {
        lock(&self.host).replace(Arc::new(host))
    }

    /// Host currently loaded
    pub fn current(&self) -> Result<Arc<ExtensionHost>> {
        lock(&self.host)
            .clone()
            .ok_or_else(|| AppError::extension("Extension used before setup"))
    }

    /// Remove the host
    pub fn take(&self) -> Option<Arc<ExtensionHost>> {
        lock(&self.host).take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{result_channel, ResultReceiver};
    use serde_json::json;
    use std::io::Write;

    fn script(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".js").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    fn spec(path: &Path, shape: ExtensionShape) -> ExtensionSpec {
        ExtensionSpec {
            path: path.to_path_buf(),
            unit_name: "unit".to_string(),
            identity: "unit_test".to_string(),
            shape,
        }
    }

    fn io() -> (HostIo, ResultReceiver) {
        let (tx, rx) = result_channel(16);
        (HostIo::new(tx, Duration::from_secs(5)).unwrap(), rx)
    }

    async fn load(path: &Path, shape: ExtensionShape) -> Result<ExtensionHost> {
        ExtensionHost::load(spec(path, shape), io().0).await
    }

    async fn invoke(host: &ExtensionHost, target: &str) -> Invocation {
        host.call(target, "x", target).await.unwrap().invocation.unwrap()
    }

    fn returned(invocation: Invocation) -> serde_json::Value {
        match invocation {
            Invocation::Completed(Some(value)) => value,
            other => panic!("expected a returned value, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("LoadTest"));
        assert!(is_identifier("_private$"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("a.b"));
        assert!(!is_identifier("x; while(true){}"));
    }

    #[test]
    fn test_module_file_resolution() {
        let base = Path::new("/opt/guns");
        assert_eq!(resolve_module_file(base, "load"), PathBuf::from("/opt/guns/load.js"));
        assert_eq!(resolve_module_file(base, "load.mjs"), PathBuf::from("/opt/guns/load.mjs"));
    }

    #[test]
    fn test_host_io_needs_runtime() {
        let (tx, _rx) = result_channel(1);
        let err = HostIo::new(tx, Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.category(), "INTERNAL");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = load(Path::new("/nonexistent/x.js"), ExtensionShape::Function)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "EXTENSION_LOAD");
        assert!(err.to_string().contains("Extension file not found"));
    }

    #[tokio::test]
    async fn test_missing_symbol() {
        let file = script("function fire() { return 1; }");
        let err = load(file.path(), ExtensionShape::Function).await.unwrap_err();
        assert!(err.to_string().contains("function 'shoot' was not found in 'unit' module"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_load_error() {
        let file = script("function shoot( {");
        let err = load(file.path(), ExtensionShape::Function).await.unwrap_err();
        assert_eq!(err.category(), "EXTENSION_LOAD");
    }

    #[tokio::test]
    async fn test_function_call_returns_json() {
        let file = script(
            "var seen = null;\n\
             function init(options) { seen = options.base; }\n\
             function shoot(payload, marker) { return { size_in: payload.length, tag: marker, base: seen }; }",
        );
        let host = load(file.path(), ExtensionShape::Function).await.unwrap();
        host.init_hook(json!({ "base": "alpha" })).await.unwrap();

        let call = host.call("shoot", "abcd", "m#1").await.unwrap();
        assert_eq!(call.steps, 0);
        let Invocation::Completed(Some(result)) = call.invocation.unwrap() else {
            panic!("expected a returned object");
        };
        assert_eq!(result["size_in"].as_f64(), Some(4.0));
        assert_eq!(result["tag"], json!("m#1"));
        assert_eq!(result["base"], json!("alpha"));

        host.shutdown().await.unwrap();
        host.shutdown().await.unwrap();
        assert!(host.call("shoot", "", "").await.is_err());
    }

    #[tokio::test]
    async fn test_scenario_table_lookup() {
        let file = script("var SCENARIOS = { login: function(p, m) { return null; } };");
        let host = load(file.path(), ExtensionShape::ScenarioTable).await.unwrap();
        host.init_hook(json!({})).await.unwrap();

        assert_eq!(invoke(&host, "login").await, Invocation::Completed(None));
        assert_eq!(invoke(&host, "logout").await, Invocation::NotFound);
        assert_eq!(invoke(&host, "toString").await, Invocation::NotFound);
        assert_eq!(invoke(&host, "hasOwnProperty").await, Invocation::NotFound);
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_class_dispatch_skips_hooks_and_builtins() {
        let file = script(
            "class Base { inherited(p) { return { size_in: 7 }; } }\n\
             class Gun extends Base {\n\
                 constructor(options) { super(); this.torn = false; }\n\
                 setup(param) {}\n\
                 teardown() { this.torn = true; }\n\
                 index(p) { return { size_in: 1 }; }\n\
             }",
        );
        let shape = ExtensionShape::Class {
            class_name: "Gun".to_string(),
        };
        let host = load(file.path(), shape).await.unwrap();
        host.init_hook(json!({})).await.unwrap();

        for name in ["constructor", "setup", "teardown", "toString", "valueOf"] {
            assert_eq!(invoke(&host, name).await, Invocation::NotFound, "{}", name);
        }
        assert_eq!(returned(invoke(&host, "index").await)["size_in"].as_f64(), Some(1.0));
        assert_eq!(returned(invoke(&host, "inherited").await)["size_in"].as_f64(), Some(7.0));
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_thrown_exception_is_extension_error() {
        let file = script("function shoot(p, m) { throw new Error('kaboom'); }");
        let host = load(file.path(), ExtensionShape::Function).await.unwrap();
        let err = host.call("shoot", "", "").await.unwrap().invocation.unwrap_err();
        assert_eq!(err.category(), "EXTENSION");
        assert!(err.to_string().contains("kaboom"));
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_measure_emits_steps() {
        let file = script(
            "function shoot(p, m) {\n\
                 measure('step#1', function () { return { size_in: 3, proto_code: 201 }; });\n\
                 try { measure('step#2', function () { throw new Error('nope'); }); } catch (e) {}\n\
                 return measure('step#3', function () { return 5; });\n\
             }",
        );
        let (io, mut rx) = io();
        let host = ExtensionHost::load(spec(file.path(), ExtensionShape::Function), io)
            .await
            .unwrap();

        let call = host.call("shoot", "", "outer").await.unwrap();
        assert_eq!(call.steps, 3);
        assert_eq!(returned(call.invocation.unwrap()).as_f64(), Some(5.0));
        host.shutdown().await.unwrap();

        let records: Vec<_> = std::iter::from_fn(|| rx.try_drain()).collect();
        let tags: Vec<&str> = records.iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(tags, vec!["step#1", "step#2", "step#3"]);
        assert_eq!((records[0].size_in, records[0].proto_code), (3, 201));
        assert_eq!((records[1].net_code, records[1].proto_code), (1, 500));
        assert!(records[2].is_success());
    }

    #[tokio::test]
    async fn test_measure_rejects_bad_arguments() {
        let file = script("function shoot(p, m) { measure(m, 'not a function'); }");
        let host = load(file.path(), ExtensionShape::Function).await.unwrap();
        let err = host.call("shoot", "", "x").await.unwrap().invocation.unwrap_err();
        assert!(err.to_string().contains("measure: body must be a function"));
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_call_time_excludes_queueing() {
        let file = script(
            "function shoot(p, m) { var end = Date.now() + 50; while (Date.now() < end) {} }",
        );
        let host = Arc::new(load(file.path(), ExtensionShape::Function).await.unwrap());

        let calls: Vec<_> = (0..4)
            .map(|_| {
                let host = Arc::clone(&host);
                tokio::spawn(async move { host.call("shoot", "", "").await.unwrap() })
            })
            .collect();
        for call in futures::future::join_all(calls).await {
            let call = call.unwrap();
            assert!(call.invocation.is_ok());
            assert!(call.elapsed >= Duration::from_millis(45));
            assert!(call.elapsed < Duration::from_millis(100), "{:?}", call.elapsed);
        }
        host.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_slot_lifecycle() {
        let slot = ExtensionSlot::new();
        assert!(slot.current().is_err());

        let file = script("function shoot(p, m) {}");
        let host = load(file.path(), ExtensionShape::Function).await.unwrap();
        assert!(slot.install(host).is_none());
        assert_eq!(slot.current().unwrap().identity(), "unit_test");

        let host = slot.take().unwrap();
        host.shutdown().await.unwrap();
        assert!(slot.current().is_err());
    }
}
