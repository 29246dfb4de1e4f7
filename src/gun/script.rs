//! Plumbing shared by the script-backed guns

use super::{scenario_name, GunOptions, Shot};
use crate::channel::ResultSender;
use crate::error::{AppError, Result};
use crate::extension::{Call, ExtensionHost, HostIo, Invocation};
use crate::types::Fired;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// Host I/O for a script gun; option `timeout` (seconds) bounds each `fetch`
pub(crate) fn script_io(options: &GunOptions, results: &ResultSender) -> Result<HostIo> {
    let timeout_secs: f64 =
        options.get_parsed_or("timeout", crate::defaults::HTTP_TIMEOUT_SECS as f64)?;
    if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
        return Err(AppError::gun_config("Script fetch timeout must be greater than 0"));
    }
    HostIo::new(results.clone(), Duration::from_secs_f64(timeout_secs))
}

/// Fold a finished call into the shot opened for it
///
/// Unless the script set it, `interval_real` is the time the script ran on
/// the engine thread. A call that emitted its own records through
/// `measure` leaves no enclosing record.
pub(crate) fn settle(mut shot: Shot<'_>, call: Call) -> Result<Fired> {
    if call.steps > 0 {
        shot.discard();
        return call.invocation.map(|_| Fired::Measured);
    }

    shot.interval_real = Some(call.elapsed_us());
    match call.invocation {
        Ok(Invocation::Completed(Some(value))) => {
            shot.apply_overrides(&value);
            Ok(Fired::Measured)
        }
        Ok(_) => Ok(Fired::Measured),
        Err(err) => Err(shot.fail(err)),
    }
}

/// Fire one missile at the scenario its marker names
///
/// The scenario receives the normalized name as its marker. A marker that
/// matches no scenario emits nothing and bumps `skipped`.
pub(crate) async fn fire_scenario(
    host: &ExtensionHost,
    results: &ResultSender,
    skipped: &AtomicU64,
    payload: &str,
    marker: &str,
) -> Result<Fired> {
    let name = scenario_name(marker);
    let mut shot = results.measure(marker);

    let call = match host.call(name, payload, name).await {
        Ok(call) => call,
        Err(err) => return Err(shot.fail(err)),
    };

    if matches!(call.invocation, Ok(Invocation::NotFound)) {
        shot.discard();
        let skipped = skipped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(%marker, scenario = %name, skipped, "Scenario not found");
        return Ok(Fired::Skipped);
    }
    settle(shot, call)
}
