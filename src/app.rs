//! Main application orchestration and execution
//!
//! Wires one run together: ammo reader, result channel, phout writer task,
//! gun, and the worker pool. Ctrl+C raises the stop signal; missiles already
//! in flight finish and their results are still written.

use crate::{
    ammo::AmmoReader,
    channel::{result_channel, ChannelSnapshot},
    error::{AppError, Result},
    executor::{ExecutionConfig, ExecutionSummary, ShootingExecutor},
    gun::{build_gun, GunOptions},
    models::Config,
    multireader::StopSignal,
    phout::{PhoutWriter, WriterStats},
    types::GunKind,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything a finished run reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub gun: GunKind,
    pub execution: ExecutionSummary,
    pub channel: ChannelSnapshot,
    pub writer: WriterStats,
    pub phout_file: PathBuf,
    /// Whether the run ended on Ctrl+C rather than on empty ammo
    pub interrupted: bool,
}

impl RunReport {
    /// Measurements that never reached the phout file
    pub fn lost(&self) -> u64 {
        self.channel.lost()
    }
}

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    stop: StopSignal,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stop: StopSignal::new(),
        }
    }

    /// Signal that stops the run when raised
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run the application until the ammo is spent or the stop signal is raised
    pub async fn run(self) -> Result<RunReport> {
        let config = &self.config;
        let kind = config.gun_kind()?;
        let ammo = AmmoReader::open(&config.ammo_file, config.ammo_format()?, config.loops)?;
        info!(
            gun = %kind,
            ammo = %config.ammo_file.display(),
            missiles = ammo.len(),
            "Loaded ammunition"
        );

        let (sender, receiver) = result_channel(config.results_capacity);
        let writer = PhoutWriter::create(&config.phout_file).await?;
        let writer_task = tokio::spawn(writer.run(receiver));

        let options = GunOptions::from(config.gun_options.clone());
        let gun = build_gun(kind, &options, sender.clone())?;

        let interrupt = watch_interrupt(self.stop.clone());
        let executor = ShootingExecutor::new(ExecutionConfig {
            workers: config.workers,
        })
        .with_stop_signal(self.stop.clone());

        let outcome = executor.run(Arc::clone(&gun), ammo).await;
        interrupt.abort();

        // The writer ends once every sender is gone, the gun's included.
        let channel = sender.stats();
        drop(gun);
        drop(sender);
        let writer = writer_task
            .await
            .map_err(|e| AppError::internal(format!("Phout writer task failed: {}", e)))??;

        let execution = outcome?;
        if channel.dropped > 0 {
            warn!(dropped = channel.dropped, "Result channel overflowed; some measurements were dropped");
        }

        Ok(RunReport {
            gun: kind,
            execution,
            channel,
            writer,
            phout_file: config.phout_file.clone(),
            interrupted: self.stop.is_set(),
        })
    }
}

fn watch_interrupt(stop: StopSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, finishing shots in flight");
                stop.set();
            }
            Err(e) => debug!(error = %e, "Ctrl+C handler unavailable"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn log_config(dir: &tempfile::TempDir, ammo: &str) -> Config {
        let ammo_path = dir.path().join("ammo.txt");
        let mut file = std::fs::File::create(&ammo_path).unwrap();
        write!(file, "{}", ammo).unwrap();

        let mut config = Config::default();
        config.ammo_file = ammo_path;
        config.phout_file = dir.path().join("phout.txt");
        config.workers = 2;
        config.set_option("param", "smoke");
        config
    }

    #[tokio::test]
    async fn test_log_gun_run_writes_phout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = log_config(&dir, "a\nb\nc\n");
        config.loops = Some(2);

        let report = App::new(config.clone()).run().await.unwrap();

        assert_eq!(report.gun, GunKind::Log);
        assert_eq!(report.execution.shots, 6);
        assert_eq!(report.execution.measured, 6);
        assert_eq!(report.writer.written, 6);
        assert_eq!(report.lost(), 0);
        assert!(!report.interrupted);

        let phout = std::fs::read_to_string(&config.phout_file).unwrap();
        assert_eq!(phout.lines().count(), 6);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_endless_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = log_config(&dir, "x\n");
        config.loops = None;

        let app = App::new(config);
        let stop = app.stop_signal();
        let run = tokio::spawn(app.run());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stop.set();

        let report = run.await.unwrap().unwrap();
        assert!(report.interrupted);
        assert!(report.execution.shots > 0);
        assert_eq!(report.writer.written + report.channel.dropped, report.execution.measured);
    }

    #[tokio::test]
    async fn test_missing_gun_option_fails_before_shooting() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = log_config(&dir, "a\n");
        config.gun_options.clear();

        let err = App::new(config).run().await.unwrap_err();
        assert_eq!(err.category(), "GUN_CONFIG");
    }

    #[tokio::test]
    async fn test_missing_ammo_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = log_config(&dir, "a\n");
        config.ammo_file = dir.path().join("nope.txt");

        let err = App::new(config).run().await.unwrap_err();
        assert_eq!(err.category(), "IO");
    }
}
