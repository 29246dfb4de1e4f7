//! BFG Shooter
//!
//! The shooting and telemetry core of a load-testing engine: pluggable guns
//! that execute shots against a target, a measurement scope that turns each
//! shot into a phout record, a drop-on-full result channel feeding the
//! aggregator, and a shared-file multiplexer that lets several cursors tail a
//! file another process is still writing.

pub mod ammo;
pub mod app;
pub mod channel;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extension;
pub mod gun;
pub mod logging;
pub mod models;
pub mod multireader;
pub mod output;
pub mod phout;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use channel::{result_channel, ChannelSnapshot, ResultReceiver, ResultSender};
pub use gun::{build_gun, Gun, GunOptions, Shot};
pub use models::{Config, Measurement, ShotRecord};
pub use multireader::{Chunk, FileLike, FileMultiReader, LockPolicy, ReadMode, StopSignal};
pub use types::{Fired, GunKind, Missile};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// One-line description of the build: version, commit, target and time
pub fn build_info() -> String {
    format!(
        "{} {} ({}, {}, built {})",
        PKG_NAME,
        VERSION,
        option_env!("BFG_GIT_COMMIT").unwrap_or("unknown commit"),
        env!("BFG_TARGET"),
        env!("BFG_BUILD_TIME")
    )
}

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_GUN_TYPE: &str = "log";
    pub const DEFAULT_AMMO_FILE: &str = "ammo.txt";
    pub const DEFAULT_PHOUT_FILE: &str = "phout.txt";
    pub const DEFAULT_LOOPS: u64 = 1;
    pub const DEFAULT_RESULTS_CAPACITY: usize = 10_000;
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// 50 MiB, the default chunk a shared-file cursor asks for
    pub const DEFAULT_CACHE_SIZE: usize = 50 * 1024 * 1024;

    pub const LOCK_RETRY_MIN_JITTER: Duration = Duration::from_millis(5);
    pub const LOCK_RETRY_MAX_JITTER: Duration = Duration::from_millis(20);
    pub const LOCK_RETRY_BUDGET: Duration = Duration::from_secs(10);

    pub const HTTP_TIMEOUT_SECS: u64 = 11;
    pub const SQL_POOL_SIZE: u32 = 10;
    pub const SQL_ACQUIRE_TIMEOUT_SECS: u64 = 30;

    /// Default worker count: one per logical CPU
    pub fn default_workers() -> usize {
        num_cpus::get().max(1)
    }
}
