//! Shooting executor
//!
//! A fixed pool of tokio tasks pulls missiles from one shared ammo iterator
//! and fires them through one shared gun. A failed shot is logged and
//! counted; it never stops the pool.

use crate::{
    error::Result,
    gun::Gun,
    multireader::StopSignal,
    types::{Fired, Missile},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Basic execution configuration for the shooting executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of concurrent workers
    pub workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: crate::defaults::default_workers(),
        }
    }
}

/// Summary of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Wall time from setup to teardown
    pub total_duration: Duration,
    /// Missiles pulled from the ammo
    pub shots: u64,
    /// Shots that emitted a measurement
    pub measured: u64,
    /// Shots whose marker matched no scenario
    pub skipped: u64,
    /// Shots that returned an error
    pub failed: u64,
}

#[derive(Debug, Default)]
struct ShotCounters {
    shots: AtomicU64,
    measured: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

type SharedAmmo = Arc<Mutex<Box<dyn Iterator<Item = Missile> + Send>>>;

/// Runs a gun against an ammo source with a fixed worker pool
#[derive(Debug, Clone, Default)]
pub struct ShootingExecutor {
    config: ExecutionConfig,
    stop: StopSignal,
}

impl ShootingExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
        }
    }

    /// Stop pulling ammo once `stop` is raised
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Set up the gun, shoot all ammo, tear the gun down
    pub async fn run<I>(&self, gun: Arc<dyn Gun>, ammo: I) -> Result<ExecutionSummary>
    where
        I: Iterator<Item = Missile> + Send + 'static,
    {
        let started = Instant::now();
        let workers = self.config.workers.max(1);
        info!(gun = %gun.kind(), workers, "Starting shooting");

        gun.setup().await?;

        let ammo: SharedAmmo = Arc::new(Mutex::new(Box::new(ammo)));
        let counters = Arc::new(ShotCounters::default());

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let gun = Arc::clone(&gun);
                let ammo = Arc::clone(&ammo);
                let counters = Arc::clone(&counters);
                let stop = self.stop.clone();
                tokio::spawn(async move { shoot_until_empty(worker, gun, ammo, counters, stop).await })
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Shooting worker crashed");
            }
        }

        let teardown = gun.teardown().await;

        let summary = ExecutionSummary {
            total_duration: started.elapsed(),
            shots: counters.shots.load(Ordering::Relaxed),
            measured: counters.measured.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        };
        info!(
            shots = summary.shots,
            measured = summary.measured,
            skipped = summary.skipped,
            failed = summary.failed,
            "Shooting finished in {:.2}s",
            summary.total_duration.as_secs_f64()
        );

        teardown?;
        Ok(summary)
    }
}

async fn shoot_until_empty(
    worker: usize,
    gun: Arc<dyn Gun>,
    ammo: SharedAmmo,
    counters: Arc<ShotCounters>,
    stop: StopSignal,
) {
    loop {
        if stop.is_set() {
            debug!(worker, "Stop requested");
            break;
        }

        let missile = {
            let mut ammo = ammo.lock().unwrap_or_else(PoisonError::into_inner);
            ammo.next()
        };
        let Some(missile) = missile else {
            break;
        };

        counters.shots.fetch_add(1, Ordering::Relaxed);
        match gun.shoot(&missile.payload, &missile.marker).await {
            Ok(Fired::Measured) => {
                counters.measured.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Fired::Skipped) => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker, marker = %missile.marker, error = %e, "Shot returned an error");
            }
        }

        // Guns that never suspend must not starve the result writer.
        tokio::task::yield_now().await;
    }
    debug!(worker, "Worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::types::GunKind;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    /// Gun that measures nothing and reacts to markers
    #[derive(Default)]
    struct ScriptedGun {
        set_up: AtomicBool,
        torn_down: AtomicBool,
        fail_setup: bool,
        shots: AtomicU64,
    }

    #[async_trait]
    impl Gun for ScriptedGun {
        fn kind(&self) -> GunKind {
            GunKind::Custom
        }

        async fn setup(&self) -> Result<()> {
            if self.fail_setup {
                return Err(AppError::extension_load("no module"));
            }
            self.set_up.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn shoot(&self, _payload: &str, marker: &str) -> Result<Fired> {
            assert!(self.set_up.load(Ordering::SeqCst));
            self.shots.fetch_add(1, Ordering::SeqCst);
            match marker {
                "bad" => Err(AppError::transport("reset")),
                "skip" => Ok(Fired::Skipped),
                _ => Ok(Fired::Measured),
            }
        }

        async fn teardown(&self) -> Result<()> {
            self.torn_down.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn ammo(markers: &[&str]) -> Vec<Missile> {
        markers.iter().map(|m| Missile::new("/", *m)).collect()
    }

    #[tokio::test]
    async fn test_run_counts_outcomes() {
        let gun = Arc::new(ScriptedGun::default());
        let executor = ShootingExecutor::new(ExecutionConfig { workers: 4 });
        let summary = executor
            .run(gun.clone(), ammo(&["a", "bad", "skip", "b", "bad"]).into_iter())
            .await
            .unwrap();

        assert_eq!(summary.shots, 5);
        assert_eq!(summary.measured, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 2);
        assert!(gun.torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_setup_failure_aborts() {
        let gun = Arc::new(ScriptedGun {
            fail_setup: true,
            ..Default::default()
        });
        let executor = ShootingExecutor::new(ExecutionConfig { workers: 2 });
        let err = executor.run(gun.clone(), ammo(&["a"]).into_iter()).await.unwrap_err();

        assert_eq!(err.category(), "EXTENSION_LOAD");
        assert_eq!(gun.shots.load(Ordering::SeqCst), 0);
        assert!(!gun.torn_down.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_signal_ends_unbounded_ammo() {
        let gun = Arc::new(ScriptedGun::default());
        let stop = StopSignal::new();
        let executor = ShootingExecutor::new(ExecutionConfig { workers: 2 }).with_stop_signal(stop.clone());

        let trigger = stop.clone();
        let endless = std::iter::repeat_with(move || {
            trigger.set();
            Missile::unmarked("/")
        });
        let summary = executor.run(gun, endless).await.unwrap();
        assert!(summary.shots >= 1);
        assert!(summary.shots <= 2);
    }
}
