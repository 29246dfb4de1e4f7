//! Synthetic gun that only logs, used to smoke-test the pipeline

use super::Gun;
use crate::channel::ResultSender;
use crate::error::Result;
use crate::gun::GunOptions;
use crate::types::{Fired, GunKind};
use async_trait::async_trait;
use rand::Rng;
use tracing::info;

/// Bounds of the fake response time, in milliseconds
const MIN_INTERVAL_MS: u64 = 2;
const MAX_INTERVAL_MS: u64 = 30_000;

/// Gun that performs no I/O and reports a random interval
#[derive(Debug)]
pub struct LogGun {
    param: String,
    results: ResultSender,
}

impl LogGun {
    /// Requires option `param`
    pub fn new(options: &GunOptions, results: ResultSender) -> Result<Self> {
        let param = options.get("param")?.to_string();
        info!(gun = "log", %param, "Initialized log gun");
        Ok(Self { param, results })
    }

    /// The configured `param` value
    pub fn param(&self) -> &str {
        &self.param
    }
}

#[async_trait]
impl Gun for LogGun {
    fn kind(&self) -> GunKind {
        GunKind::Log
    }

    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired> {
        info!(gun = "log", %marker, %payload, "Missile");
        let mut shot = self.results.measure(marker);
        let interval_ms = rand::rng().random_range(MIN_INTERVAL_MS..=MAX_INTERVAL_MS);
        shot.interval_real = Some(interval_ms * 1000);
        Ok(Fired::Measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::result_channel;

    #[test]
    fn test_param_required() {
        let (tx, _rx) = result_channel(4);
        assert!(LogGun::new(&GunOptions::new(), tx).is_err());
    }

    #[tokio::test]
    async fn test_shoot_reports_interval_in_range() {
        let (tx, mut rx) = result_channel(64);
        let gun = LogGun::new(&GunOptions::new().with("param", "p"), tx).unwrap();
        assert_eq!(gun.param(), "p");

        for _ in 0..32 {
            assert_eq!(gun.shoot("/ping", "ping").await.unwrap(), Fired::Measured);
        }
        while let Some(record) = rx.try_drain() {
            assert_eq!(record.tag, "ping");
            assert!(record.interval_real >= 2_000);
            assert!(record.interval_real <= 30_000_000);
            assert_eq!(record.interval_real % 1000, 0);
            assert!(record.is_success());
        }
    }
}
