//! Class-based extension gun

use super::script::{fire_scenario, script_io};
use super::{Gun, GunOptions};
use crate::channel::ResultSender;
use crate::error::Result;
use crate::extension::{resolve_module_file, ExtensionHost, ExtensionShape, ExtensionSlot, ExtensionSpec};
use crate::types::{Fired, GunKind};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Gun whose scenarios are methods of a user class
///
/// At setup the module is evaluated in a fresh engine, the class is
/// instantiated with the gun options and its optional `setup(init_param)`
/// runs; `teardown()` runs at teardown.
#[derive(Debug)]
pub struct UltimateGun {
    module_file: PathBuf,
    module_name: String,
    class_name: String,
    init_param: String,
    options: GunOptions,
    host: ExtensionSlot,
    skipped: AtomicU64,
    results: ResultSender,
}

impl UltimateGun {
    /// Requires `module_path`, `module_name` and `class_name`
    pub fn new(options: &GunOptions, results: ResultSender) -> Result<Self> {
        let module_path = PathBuf::from(options.get("module_path")?);
        let module_name = options.get("module_name")?.to_string();
        let class_name = options.get("class_name")?.to_string();
        let init_param = options.get_or("init_param", "").to_string();

        Ok(Self {
            module_file: resolve_module_file(&module_path, &module_name),
            module_name,
            class_name,
            init_param,
            options: options.clone(),
            host: ExtensionSlot::new(),
            skipped: AtomicU64::new(0),
            results,
        })
    }

    /// Identity of the currently loaded unit, if any
    pub fn identity(&self) -> Option<String> {
        self.host.current().ok().map(|host| host.identity().to_string())
    }
}

#[async_trait]
impl Gun for UltimateGun {
    fn kind(&self) -> GunKind {
        GunKind::Ultimate
    }

    async fn setup(&self) -> Result<()> {
        let identity = format!("{}_{}", self.module_name, Utc::now().timestamp());
        debug!(gun = "ultimate", %identity, class = %self.class_name, "Loading module");

        let io = script_io(&self.options, &self.results)?;
        let host = ExtensionHost::load(
            ExtensionSpec {
                path: self.module_file.clone(),
                unit_name: self.module_name.clone(),
                identity,
                shape: ExtensionShape::Class {
                    class_name: self.class_name.clone(),
                },
            },
            io,
        )
        .await?;
        host.init_hook(self.options.as_json()).await?;
        host.setup_hook(&self.init_param).await?;

        if let Some(previous) = self.host.install(host) {
            previous.shutdown().await?;
        }
        info!(gun = "ultimate", class = %self.class_name, "Ultimate gun ready");
        Ok(())
    }

    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired> {
        let host = self.host.current()?;
        fire_scenario(&host, &self.results, &self.skipped, payload, marker).await
    }

    async fn teardown(&self) -> Result<()> {
        if let Some(host) = self.host.take() {
            let hook = host.teardown_hook().await;
            host.shutdown().await?;
            hook?;
        }
        Ok(())
    }

    fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
