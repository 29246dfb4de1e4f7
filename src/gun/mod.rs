//! Guns: configuration-bound workers that execute shots
//!
//! Every gun wraps its transaction in a [`Shot`] scope obtained from the
//! shared [`ResultSender`], so timing, outcome codes and emission to the
//! result channel are uniform across variants. One gun instance serves all
//! workers of a run and must tolerate concurrent `shoot` calls.

pub mod custom;
pub mod http;
pub mod log_gun;
pub mod measure;
pub mod scenario;
mod script;
pub mod sql;
pub mod ultimate;


pub use custom::CustomGun;
pub use http::HttpGun;
pub use log_gun::LogGun;
pub use measure::Shot;
pub use scenario::ScenarioGun;
pub use sql::SqlGun;
pub use ultimate::UltimateGun;

use crate::channel::ResultSender;
use crate::error::{AppError, Result};
use crate::types::{Fired, GunKind};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// Scenario used when a marker has no name part
pub const DEFAULT_SCENARIO: &str = "default";

/// Shooting interface shared by all gun variants
#[async_trait]
pub trait Gun: Send + Sync {
    /// Which variant this is
    fn kind(&self) -> GunKind;

    /// Prepare connections or load user code; errors abort the run
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Fire one missile
    ///
    /// Returns `Fired::Skipped` when nothing was measured. Errors have
    /// already been recorded in the emitted measurement.
    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired>;

    /// Release whatever `setup` acquired
    async fn teardown(&self) -> Result<()> {
        Ok(())
    }

    /// Shots that matched no scenario
    fn skipped(&self) -> u64 {
        0
    }
}

/// Scenario name carried by a marker: the part before the last `#`
pub fn scenario_name(marker: &str) -> &str {
    let name = marker.rsplit_once('#').map_or(marker, |(name, _)| name);
    if name.is_empty() {
        DEFAULT_SCENARIO
    } else {
        name
    }
}

/// Key/value parameters for a gun
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GunOptions {
    values: BTreeMap<String, String>,
}

impl GunOptions {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a value
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    /// Whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Required value
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| AppError::gun_config(format!("Missing key: {}", key)))
    }

    /// Value or a default
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.values.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Required value parsed into `T`
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.get(key)?;
        raw.trim().parse().map_err(|e| {
            AppError::gun_config(format!("Invalid value '{}' for key {}: {}", raw, key, e))
        })
    }

    /// Optional value parsed into `T`, falling back to `default` when absent
    pub fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        if self.contains(key) {
            self.get_parsed(key)
        } else {
            Ok(default)
        }
    }

    /// Options as a JSON object, numbers and booleans typed where they parse
    pub fn as_json(&self) -> serde_json::Value {
        let object = self
            .values
            .iter()
            .map(|(key, raw)| {
                let value = match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v,
                    _ => serde_json::Value::String(raw.clone()),
                };
                (key.clone(), value)
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Iterate over all key/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for GunOptions {
    fn from(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for GunOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Build the gun for `kind`; missing required options fail here
pub fn build_gun(kind: GunKind, options: &GunOptions, results: ResultSender) -> Result<Arc<dyn Gun>> {
    let gun: Arc<dyn Gun> = match kind {
        GunKind::Log => Arc::new(LogGun::new(options, results)?),
        GunKind::Http => Arc::new(HttpGun::new(options, results)?),
        GunKind::Sql => Arc::new(SqlGun::new(options, results)?),
        GunKind::Custom => Arc::new(CustomGun::new(options, results)?),
        GunKind::Scenario => Arc::new(ScenarioGun::new(options, results)?),
        GunKind::Ultimate => Arc::new(UltimateGun::new(options, results)?),
    };
    Ok(gun)
}
