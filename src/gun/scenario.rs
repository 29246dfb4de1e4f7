//! Gun dispatching markers to a table of user scenario functions

use super::script::{fire_scenario, script_io};
use super::{Gun, GunOptions};
use crate::channel::ResultSender;
use crate::error::Result;
use crate::extension::{resolve_module_file, ExtensionHost, ExtensionShape, ExtensionSlot, ExtensionSpec};
use crate::types::{Fired, GunKind};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Deprecated: prefer the ultimate gun
#[derive(Debug)]
pub struct ScenarioGun {
    module_file: PathBuf,
    module_name: String,
    options: GunOptions,
    host: ExtensionSlot,
    skipped: AtomicU64,
    results: ResultSender,
}

impl ScenarioGun {
    /// Requires `module_path` and `module_name`
    pub fn new(options: &GunOptions, results: ResultSender) -> Result<Self> {
        let module_path = PathBuf::from(options.get("module_path")?);
        let module_name = options.get("module_name")?.to_string();
        warn!(gun = "scenario", "The scenario gun is deprecated, use the ultimate gun instead");

        Ok(Self {
            module_file: resolve_module_file(&module_path, &module_name),
            module_name,
            options: options.clone(),
            host: ExtensionSlot::new(),
            skipped: AtomicU64::new(0),
            results,
        })
    }
}

#[async_trait]
impl Gun for ScenarioGun {
    fn kind(&self) -> GunKind {
        GunKind::Scenario
    }

    async fn setup(&self) -> Result<()> {
        let io = script_io(&self.options, &self.results)?;
        let host = ExtensionHost::load(
            ExtensionSpec {
                path: self.module_file.clone(),
                unit_name: self.module_name.clone(),
                identity: self.module_name.clone(),
                shape: ExtensionShape::ScenarioTable,
            },
            io,
        )
        .await?;
        host.init_hook(self.options.as_json()).await?;

        if let Some(previous) = self.host.install(host) {
            previous.shutdown().await?;
        }
        Ok(())
    }

    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired> {
        let host = self.host.current()?;
        fire_scenario(&host, &self.results, &self.skipped, payload, marker).await
    }

    async fn teardown(&self) -> Result<()> {
        if let Some(host) = self.host.take() {
            host.shutdown().await?;
        }
        Ok(())
    }

    fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}
