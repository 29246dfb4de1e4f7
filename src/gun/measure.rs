//! Measurement scope wrapped around every shot

use crate::channel::ResultSender;
use crate::models::ShotRecord;
use chrono::Utc;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tracing::warn;

/// Guard that times one shot and emits its record when dropped
///
/// The guard derefs to the mutable [`ShotRecord`] so a gun can fill in
/// sizes and codes while the shot is in flight. Dropping it, on success,
/// early return or panic, freezes the record and offers it to the result
/// channel without blocking.
#[must_use = "the shot is measured until this guard is dropped"]
pub struct Shot<'a> {
    sender: &'a ResultSender,
    record: ShotRecord,
    started: Instant,
    emit: bool,
}

impl<'a> Shot<'a> {
    pub(crate) fn open(sender: &'a ResultSender, marker: &str) -> Self {
        Self {
            sender,
            record: ShotRecord::new(marker, Utc::now()),
            started: Instant::now(),
            emit: true,
        }
    }

    /// Time since the scope opened
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record a failure and hand the error back for propagation
    ///
    /// Codes the gun already set to something other than success are kept.
    pub fn fail<E: Display>(&mut self, err: E) -> E {
        warn!(marker = %self.record.tag, error = %err, "Shot failed");
        self.record.mark_failed();
        err
    }

    /// Close the scope without emitting anything
    pub fn discard(mut self) {
        self.emit = false;
    }
}

impl Deref for Shot<'_> {
    type Target = ShotRecord;

    fn deref(&self) -> &ShotRecord {
        &self.record
    }
}

impl DerefMut for Shot<'_> {
    fn deref_mut(&mut self) -> &mut ShotRecord {
        &mut self.record
    }
}

impl Drop for Shot<'_> {
    fn drop(&mut self) {
        if !self.emit {
            return;
        }

        if std::thread::panicking() {
            warn!(marker = %self.record.tag, "Shot panicked");
            self.record.mark_failed();
        }

        let elapsed = self.started.elapsed();
        let placeholder = ShotRecord::new(String::new(), self.record.send_ts);
        let record = std::mem::replace(&mut self.record, placeholder);
        self.sender.offer(record.finish(elapsed));
    }
}

#[cfg(test)]
mod tests {
    use crate::channel::result_channel;
    use std::time::Duration;

    #[test]
    fn test_scope_emits_defaults() {
        let (tx, mut rx) = result_channel(4);
        {
            let _shot = tx.measure("index");
        }
        let record = rx.try_drain().unwrap();
        assert_eq!(record.tag, "index");
        assert_eq!(record.net_code, 0);
        assert_eq!(record.proto_code, 200);
    }

    #[test]
    fn test_unset_interval_is_elapsed_time() {
        let (tx, mut rx) = result_channel(4);
        {
            let _shot = tx.measure("sleepy");
            std::thread::sleep(Duration::from_millis(20));
        }
        let record = rx.try_drain().unwrap();
        assert!(record.interval_real >= 20_000, "got {}", record.interval_real);
        assert!(record.interval_real < 5_000_000);
    }

    #[test]
    fn test_explicit_interval_is_kept() {
        let (tx, mut rx) = result_channel(4);
        {
            let mut shot = tx.measure("fixed");
            shot.interval_real = Some(123);
        }
        assert_eq!(rx.try_drain().unwrap().interval_real, 123);
    }

    #[test]
    fn test_fail_before_codes_sets_failure_codes() {
        let (tx, mut rx) = result_channel(4);
        let err = {
            let mut shot = tx.measure("broken");
            shot.fail("connection reset")
        };
        assert_eq!(err, "connection reset");

        let record = rx.try_drain().unwrap();
        assert_eq!(record.proto_code, 500);
        assert_eq!(record.net_code, 1);
    }

    #[test]
    fn test_fail_after_codes_keeps_codes() {
        let (tx, mut rx) = result_channel(4);
        {
            let mut shot = tx.measure("partial");
            shot.proto_code = 404;
            let _ = shot.fail("bad body");
        }
        let record = rx.try_drain().unwrap();
        assert_eq!(record.proto_code, 404);
        assert_eq!(record.net_code, 1);
    }

    #[test]
    fn test_discard_emits_nothing() {
        let (tx, mut rx) = result_channel(4);
        tx.measure("ghost").discard();
        assert!(rx.try_drain().is_none());
        assert_eq!(tx.stats().offered, 0);
    }

    #[test]
    fn test_panic_inside_scope_is_recorded() {
        let (tx, mut rx) = result_channel(4);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _shot = tx.measure("panicky");
            panic!("gun exploded");
        }));
        assert!(outcome.is_err());

        let record = rx.try_drain().unwrap();
        assert_eq!(record.tag, "panicky");
        assert_eq!(record.proto_code, 500);
        assert_eq!(record.net_code, 1);
    }

    #[test]
    fn test_full_channel_does_not_block_scope() {
        let (tx, rx) = result_channel(1);
        for _ in 0..5 {
            let _shot = tx.measure("flood");
        }
        assert_eq!(rx.len(), 1);
        assert_eq!(tx.stats().dropped, 4);
    }
}
