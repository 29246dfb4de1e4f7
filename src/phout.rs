//! Phout result file writer and tailing reader

use crate::channel::ResultReceiver;
use crate::error::{AppError, Result};
use crate::models::Measurement;
use crate::multireader::{Chunk, FileLike};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Counters from one writer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Lines written
    pub written: u64,
    /// Of those, lines with a non-success code
    pub failed: u64,
}

/// Consumer of the result channel that appends phout lines to a file
#[derive(Debug)]
pub struct PhoutWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

impl PhoutWriter {
    /// Create (or truncate) the phout file
    pub async fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|e| AppError::io(format!("Failed to create {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&mut self, measurement: &Measurement, stats: &mut WriterStats) -> Result<()> {
        self.out.write_all(measurement.to_phout_line().as_bytes()).await?;
        stats.written += 1;
        if !measurement.is_success() {
            stats.failed += 1;
        }
        Ok(())
    }

    /// Drain the channel until every sender is gone
    ///
    /// Output is flushed whenever the channel runs dry so tailing readers
    /// see results while the test is still running.
    pub async fn run(mut self, mut results: ResultReceiver) -> Result<WriterStats> {
        let mut stats = WriterStats::default();

        while let Some(measurement) = results.drain().await {
            self.write(&measurement, &mut stats).await?;
            while let Some(measurement) = results.try_drain() {
                self.write(&measurement, &mut stats).await?;
            }
            self.out.flush().await?;
        }

        self.out.flush().await?;
        info!(path = %self.path.display(), written = stats.written, failed = stats.failed, "Phout writer finished");
        Ok(stats)
    }
}

/// Tag with its `#suffix` removed
pub fn normalize_tag(tag: &str) -> &str {
    tag.rsplit_once('#').map_or(tag, |(name, _)| name)
}

/// Incremental reader turning a growing phout file into measurements
#[derive(Debug)]
pub struct PhoutReader {
    source: FileLike,
    pending: Vec<u8>,
    finished: bool,
    malformed: u64,
}

impl PhoutReader {
    pub fn new(source: FileLike) -> Self {
        Self {
            source,
            pending: Vec::new(),
            finished: false,
            malformed: 0,
        }
    }

    /// Lines skipped because they did not parse
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Measurements from the next chunk
    ///
    /// `Some(vec![])` means no complete line is available yet; `None` means
    /// the producer stopped and everything has been read.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<Measurement>>> {
        if self.finished {
            return Ok(None);
        }

        match self.source.read(None).await? {
            Chunk::Data(bytes) => {
                self.pending.extend_from_slice(&bytes);
                let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
                    return Ok(Some(Vec::new()));
                };
                let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
                Ok(Some(self.parse(&complete)))
            }
            Chunk::Empty => Ok(Some(Vec::new())),
            Chunk::Finished => {
                self.finished = true;
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                debug!(bytes = rest.len(), "Flushing unterminated phout tail");
                Ok(Some(self.parse(&rest)))
            }
        }
    }

    fn parse(&mut self, bytes: &[u8]) -> Vec<Measurement> {
        let text = String::from_utf8_lossy(bytes);
        let mut parsed = Vec::new();

        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            match Measurement::from_phout_line(line) {
                Ok(mut measurement) => {
                    let tag = normalize_tag(&measurement.tag).to_string();
                    measurement.tag = tag;
                    parsed.push(measurement);
                }
                Err(err) => {
                    self.malformed += 1;
                    warn!(error = %err, line = %line, "Skipping malformed phout line");
                }
            }
        }
        parsed
    }
}
