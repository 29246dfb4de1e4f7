//! Per-shot measurement records and the phout line codec

use crate::types::{AppError, Result, NET_CODE_OK, PROTO_CODE_OK};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Number of tab-separated columns in a phout line
pub const PHOUT_COLUMNS: usize = 12;

/// Mutable view of a measurement while its shot is still in flight
///
/// `interval_real` stays `None` until the gun sets it explicitly; when the
/// scope closes the elapsed time fills the gap and the record is frozen into
/// a [`Measurement`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShotRecord {
    /// Marker of the missile being fired
    pub tag: String,
    /// Wall-clock time captured when the scope opened
    pub send_ts: DateTime<Utc>,
    /// Total duration in microseconds, if the gun knows better than the clock
    pub interval_real: Option<u64>,
    pub connect_time: u64,
    pub send_time: u64,
    pub latency: u64,
    pub receive_time: u64,
    pub interval_event: u64,
    /// Bytes sent
    pub size_out: u64,
    /// Bytes (or rows) received
    pub size_in: u64,
    /// Transport-level outcome code (0 is success)
    pub net_code: i32,
    /// Application-level outcome code (200 is success)
    pub proto_code: i32,
}

impl ShotRecord {
    /// Fresh record with default counters and success codes
    pub fn new<T: Into<String>>(tag: T, send_ts: DateTime<Utc>) -> Self {
        Self {
            tag: tag.into(),
            send_ts,
            interval_real: None,
            connect_time: 0,
            send_time: 0,
            latency: 0,
            receive_time: 0,
            interval_event: 0,
            size_out: 0,
            size_in: 0,
            net_code: NET_CODE_OK,
            proto_code: PROTO_CODE_OK,
        }
    }

    /// Mark the record as failed without overwriting codes a gun already set
    pub fn mark_failed(&mut self) {
        if self.proto_code == PROTO_CODE_OK {
            self.proto_code = crate::types::PROTO_CODE_ERROR;
        }
        if self.net_code == NET_CODE_OK {
            self.net_code = crate::types::NET_CODE_TRANSPORT_ERROR;
        }
    }

    /// Copy numeric measurement fields out of a JSON object
    ///
    /// Unknown keys and non-numeric values are ignored. Returns how many
    /// fields were applied.
    pub fn apply_overrides(&mut self, value: &serde_json::Value) -> usize {
        let Some(object) = value.as_object() else {
            return 0;
        };

        let mut applied = 0;
        for (key, value) in object {
            let applied_here = match key.as_str() {
                "interval_real" => as_counter(value).map(|v| self.interval_real = Some(v)),
                "connect_time" => as_counter(value).map(|v| self.connect_time = v),
                "send_time" => as_counter(value).map(|v| self.send_time = v),
                "latency" => as_counter(value).map(|v| self.latency = v),
                "receive_time" => as_counter(value).map(|v| self.receive_time = v),
                "interval_event" => as_counter(value).map(|v| self.interval_event = v),
                "size_out" => as_counter(value).map(|v| self.size_out = v),
                "size_in" => as_counter(value).map(|v| self.size_in = v),
                "net_code" => as_code(value).map(|v| self.net_code = v),
                "proto_code" => as_code(value).map(|v| self.proto_code = v),
                _ => None,
            };
            if applied_here.is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Freeze the record, filling `interval_real` from `elapsed` if unset
    pub fn finish(self, elapsed: Duration) -> Measurement {
        let interval_real = self
            .interval_real
            .unwrap_or_else(|| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX));

        Measurement {
            send_ts: self.send_ts,
            tag: self.tag,
            interval_real,
            connect_time: self.connect_time,
            send_time: self.send_time,
            latency: self.latency,
            receive_time: self.receive_time,
            interval_event: self.interval_event,
            size_out: self.size_out,
            size_in: self.size_in,
            net_code: self.net_code,
            proto_code: self.proto_code,
        }
    }
}

fn as_counter(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
}

fn as_code(value: &serde_json::Value) -> Option<i32> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
        .and_then(|v| i32::try_from(v).ok())
}

/// Final, immutable result of one shot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub send_ts: DateTime<Utc>,
    pub tag: String,
    pub interval_real: u64,
    pub connect_time: u64,
    pub send_time: u64,
    pub latency: u64,
    pub receive_time: u64,
    pub interval_event: u64,
    pub size_out: u64,
    pub size_in: u64,
    pub net_code: i32,
    pub proto_code: i32,
}

impl Measurement {
    /// Whether both outcome codes report success
    pub fn is_success(&self) -> bool {
        self.net_code == NET_CODE_OK && self.proto_code == PROTO_CODE_OK
    }

    /// Render as one newline-terminated phout line
    pub fn to_phout_line(&self) -> String {
        format!("{}\n", self)
    }

    /// Parse one phout line (with or without its trailing newline)
    pub fn from_phout_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != PHOUT_COLUMNS {
            return Err(AppError::parse(format!(
                "Expected {} phout columns, got {}",
                PHOUT_COLUMNS,
                fields.len()
            )));
        }

        let counter = |idx: usize, name: &str| -> Result<u64> {
            fields[idx].trim().parse::<u64>().map_err(|e| {
                AppError::parse(format!("Invalid {} '{}': {}", name, fields[idx], e))
            })
        };
        let code = |idx: usize, name: &str| -> Result<i32> {
            fields[idx].trim().parse::<i32>().map_err(|e| {
                AppError::parse(format!("Invalid {} '{}': {}", name, fields[idx], e))
            })
        };

        Ok(Self {
            send_ts: parse_timestamp(fields[0])?,
            tag: fields[1].to_string(),
            interval_real: counter(2, "interval_real")?,
            connect_time: counter(3, "connect_time")?,
            send_time: counter(4, "send_time")?,
            latency: counter(5, "latency")?,
            receive_time: counter(6, "receive_time")?,
            interval_event: counter(7, "interval_event")?,
            size_out: counter(8, "size_out")?,
            size_in: counter(9, "size_in")?,
            net_code: code(10, "net_code")?,
            proto_code: code(11, "proto_code")?,
        })
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tabs or newlines inside a tag would break the column layout
        let tag: String = self
            .tag
            .chars()
            .map(|c| if c == '\t' || c == '\n' || c == '\r' { ' ' } else { c })
            .collect();

        write!(
            f,
            "{}.{:03}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.send_ts.timestamp(),
            self.send_ts.timestamp_subsec_millis(),
            tag,
            self.interval_real,
            self.connect_time,
            self.send_time,
            self.latency,
            self.receive_time,
            self.interval_event,
            self.size_out,
            self.size_in,
            self.net_code,
            self.proto_code,
        )
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let secs: i64 = secs
        .parse()
        .map_err(|e| AppError::parse(format!("Invalid send_ts '{}': {}", raw, e)))?;

    let mut millis: u32 = 0;
    if !frac.is_empty() {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::parse(format!("Invalid send_ts '{}'", raw)));
        }
        let padded: String = frac.chars().chain("000".chars()).take(3).collect();
        millis = padded
            .parse()
            .map_err(|e| AppError::parse(format!("Invalid send_ts '{}': {}", raw, e)))?;
    }

    Utc.timestamp_opt(secs, millis * 1_000_000)
        .single()
        .ok_or_else(|| AppError::parse(format!("send_ts out of range: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_ts() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 123_000_000).unwrap()
    }

    #[test]
    fn test_new_record_defaults() {
        let record = ShotRecord::new("login", sample_ts());
        assert_eq!(record.tag, "login");
        assert_eq!(record.interval_real, None);
        assert_eq!(record.net_code, 0);
        assert_eq!(record.proto_code, 200);
        assert_eq!(record.size_in, 0);
    }

    #[test]
    fn test_finish_fills_interval_from_elapsed() {
        let record = ShotRecord::new("", sample_ts());
        let measurement = record.finish(Duration::from_millis(42));
        assert_eq!(measurement.interval_real, 42_000);
    }

    #[test]
    fn test_finish_keeps_explicit_interval() {
        let mut record = ShotRecord::new("", sample_ts());
        record.interval_real = Some(7);
        let measurement = record.finish(Duration::from_secs(3));
        assert_eq!(measurement.interval_real, 7);
    }

    #[test]
    fn test_mark_failed_respects_existing_codes() {
        let mut record = ShotRecord::new("", sample_ts());
        record.mark_failed();
        assert_eq!((record.net_code, record.proto_code), (1, 500));

        let mut record = ShotRecord::new("", sample_ts());
        record.proto_code = 404;
        record.net_code = 110;
        record.mark_failed();
        assert_eq!((record.net_code, record.proto_code), (110, 404));
    }

    #[test]
    fn test_apply_overrides() {
        let mut record = ShotRecord::new("", sample_ts());
        let applied = record.apply_overrides(&json!({
            "latency": 1500,
            "size_in": 12.0,
            "proto_code": 302,
            "unknown": 1,
            "connect_time": "fast",
        }));
        assert_eq!(applied, 3);
        assert_eq!(record.latency, 1500);
        assert_eq!(record.size_in, 12);
        assert_eq!(record.proto_code, 302);
        assert_eq!(record.connect_time, 0);

        assert_eq!(record.apply_overrides(&json!("not an object")), 0);
    }

    #[test]
    fn test_phout_line_layout() {
        let mut record = ShotRecord::new("checkout#2", sample_ts());
        record.size_out = 10;
        record.size_in = 2048;
        record.proto_code = 503;
        let line = record.finish(Duration::from_micros(1234)).to_phout_line();

        assert_eq!(line, "1700000000.123\tcheckout#2\t1234\t0\t0\t0\t0\t0\t10\t2048\t0\t503\n");
    }

    #[test]
    fn test_phout_line_parsing() {
        let parsed = Measurement::from_phout_line(
            "1700000000.5\tindex\t100\t1\t2\t3\t4\t5\t6\t7\t110\t200",
        )
        .unwrap();
        assert_eq!(parsed.send_ts.timestamp_subsec_millis(), 500);
        assert_eq!(parsed.tag, "index");
        assert_eq!(parsed.interval_real, 100);
        assert_eq!(parsed.net_code, 110);
        assert!(!parsed.is_success());
    }

    #[test]
    fn test_phout_line_rejects_garbage() {
        assert!(Measurement::from_phout_line("").is_err());
        assert!(Measurement::from_phout_line("a\tb\tc").is_err());
        assert!(Measurement::from_phout_line(
            "x.1\tindex\t100\t1\t2\t3\t4\t5\t6\t7\t0\t200"
        )
        .is_err());
    }
}
