//! Shared file multiplexer
//!
//! Several cursors tail one file, typically one another process is still
//! appending to, through a single handle. Each cursor keeps its own
//! position; every read seeks to it under one lock so reads never
//! interleave on the handle.

use crate::error::{AppError, Result};
use rand::Rng;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// Shared flag telling readers the producer has finished
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; it is never lowered again
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long and how politely to wait for the file lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    /// Shortest sleep between attempts
    pub min_jitter: Duration,
    /// Longest sleep between attempts
    pub max_jitter: Duration,
    /// Total time before giving up
    pub budget: Duration,
}

impl Default for LockPolicy {
    fn default() -> Self {
        Self {
            min_jitter: crate::defaults::LOCK_RETRY_MIN_JITTER,
            max_jitter: crate::defaults::LOCK_RETRY_MAX_JITTER,
            budget: crate::defaults::LOCK_RETRY_BUDGET,
        }
    }
}

impl LockPolicy {
    fn jitter(&self) -> Duration {
        let min = self.min_jitter.as_micros() as u64;
        let max = self.max_jitter.as_micros() as u64;
        if max <= min {
            return self.min_jitter;
        }
        Duration::from_micros(rand::rng().random_range(min..=max))
    }
}

/// What to read at a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Up to `n` bytes
    Bytes(usize),
    /// Through the next newline, or to the current end of file
    Line,
}

/// Outcome of one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data(Vec<u8>),
    /// Nothing new yet; the producer is still running
    Empty,
    /// Nothing new and the producer has stopped
    Finished,
}

impl Chunk {
    /// Bytes carried by the chunk, if any
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Chunk::Data(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Chunk::Finished)
    }
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    file: Mutex<Option<File>>,
    stop: StopSignal,
    contention: AtomicU64,
}

/// One open handle shared by any number of [`FileLike`] cursors
#[derive(Debug, Clone)]
pub struct FileMultiReader {
    shared: Arc<Shared>,
    cache_size: usize,
    policy: LockPolicy,
}

impl FileMultiReader {
    /// Open `path` for shared reading
    pub async fn open<P: AsRef<Path>>(path: P, stop: StopSignal) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| AppError::io(format!("Failed to open {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Opened shared file");

        Ok(Self {
            shared: Arc::new(Shared {
                path,
                file: Mutex::new(Some(file)),
                stop,
                contention: AtomicU64::new(0),
            }),
            cache_size: crate::defaults::DEFAULT_CACHE_SIZE,
            policy: LockPolicy::default(),
        })
    }

    /// Default chunk size handed to new cursors
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size.max(1);
        self
    }

    /// Lock acquisition policy
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.shared.stop
    }

    /// Acquisition attempts that found the lock held
    pub fn contention_count(&self) -> u64 {
        self.shared.contention.load(Ordering::Relaxed)
    }

    /// New cursor at position 0
    pub fn get_reader(&self, cache_size: Option<usize>) -> FileLike {
        FileLike {
            source: self.clone(),
            position: 0,
            cache_size: cache_size.unwrap_or(self.cache_size).max(1),
        }
    }

    async fn wait_lock(&self) -> Result<MutexGuard<'_, Option<File>>> {
        let deadline = Instant::now() + self.policy.budget;
        let mut attempts: u64 = 0;

        loop {
            if let Ok(guard) = self.shared.file.try_lock() {
                return Ok(guard);
            }
            attempts += 1;
            self.shared.contention.fetch_add(1, Ordering::Relaxed);

            if Instant::now() >= deadline {
                error!(
                    path = %self.shared.path.display(),
                    attempts,
                    "Gave up waiting for the shared file lock"
                );
                return Err(AppError::lock_contention(format!(
                    "Could not lock {} within {:?} ({} attempts)",
                    self.shared.path.display(),
                    self.policy.budget,
                    attempts
                )));
            }

            let pause = self.policy.jitter();
            trace!(attempts, ?pause, "Shared file lock busy");
            tokio::time::sleep(pause).await;
        }
    }

    /// Read at `position`; returns the chunk and the position after it
    pub async fn read_at(&self, position: u64, mode: ReadMode) -> Result<(Chunk, u64)> {
        // Sampled before reading so bytes written before the stop are never missed
        let stopped = self.shared.stop.is_set();

        let mut guard = self.wait_lock().await?;
        let file = guard.as_mut().ok_or_else(|| {
            AppError::io(format!("{} has been closed", self.shared.path.display()))
        })?;

        file.seek(SeekFrom::Start(position)).await?;
        let mut data = Vec::new();
        match mode {
            ReadMode::Bytes(len) => {
                (&mut *file).take(len as u64).read_to_end(&mut data).await?;
            }
            ReadMode::Line => {
                BufReader::new(&mut *file).read_until(b'\n', &mut data).await?;
            }
        }
        drop(guard);

        let next = position + data.len() as u64;
        let chunk = if !data.is_empty() {
            Chunk::Data(data)
        } else if stopped {
            Chunk::Finished
        } else {
            Chunk::Empty
        };
        Ok((chunk, next))
    }

    /// Close the handle; later reads fail. Calling twice is harmless
    pub async fn close(&self) -> Result<()> {
        let mut guard = self.wait_lock().await?;
        if guard.take().is_some() {
            debug!(path = %self.shared.path.display(), "Closed shared file");
        }
        Ok(())
    }
}

/// Cursor over a [`FileMultiReader`]
#[derive(Debug, Clone)]
pub struct FileLike {
    source: FileMultiReader,
    position: u64,
    cache_size: usize,
}

impl FileLike {
    /// Read up to `len` bytes, defaulting to the cursor's cache size
    pub async fn read(&mut self, len: Option<usize>) -> Result<Chunk> {
        let len = len.unwrap_or(self.cache_size);
        let (chunk, next) = self.source.read_at(self.position, ReadMode::Bytes(len)).await?;
        self.position = next;
        Ok(chunk)
    }

    /// Read through the next newline
    ///
    /// A line still being written comes back without its newline.
    pub async fn readline(&mut self) -> Result<Chunk> {
        let (chunk, next) = self.source.read_at(self.position, ReadMode::Line).await?;
        self.position = next;
        Ok(chunk)
    }

    /// Bytes consumed so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = FileMultiReader::open("/nonexistent/phout.log", StopSignal::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), "IO");
    }

    #[tokio::test]
    async fn test_read_bytes_and_lines() {
        let file = fixture(b"first\nsecond\nthird");
        let reader = FileMultiReader::open(file.path(), StopSignal::new()).await.unwrap();
        let mut cursor = reader.get_reader(Some(4));

        assert_eq!(cursor.read(None).await.unwrap(), Chunk::Data(b"firs".to_vec()));
        assert_eq!(cursor.readline().await.unwrap(), Chunk::Data(b"t\n".to_vec()));
        assert_eq!(cursor.readline().await.unwrap(), Chunk::Data(b"second\n".to_vec()));
        assert_eq!(cursor.readline().await.unwrap(), Chunk::Data(b"third".to_vec()));
        assert_eq!(cursor.position(), 18);
        assert_eq!(cursor.readline().await.unwrap(), Chunk::Empty);
    }

    #[tokio::test]
    async fn test_end_of_stream_needs_stop_signal() {
        let file = fixture(b"abc");
        let stop = StopSignal::new();
        let reader = FileMultiReader::open(file.path(), stop.clone()).await.unwrap();
        let mut cursor = reader.get_reader(None);
        assert_eq!(cursor.cache_size(), crate::defaults::DEFAULT_CACHE_SIZE);

        assert_eq!(cursor.read(None).await.unwrap(), Chunk::Data(b"abc".to_vec()));
        assert_eq!(cursor.read(None).await.unwrap(), Chunk::Empty);

        stop.set();
        assert!(cursor.read(None).await.unwrap().is_finished());
        assert!(cursor.readline().await.unwrap().is_finished());
    }

    #[tokio::test]
    async fn test_cursors_are_independent() {
        let file = fixture(b"0123456789");
        let reader = FileMultiReader::open(file.path(), StopSignal::new()).await.unwrap();
        let mut a = reader.get_reader(Some(3));
        let mut b = reader.get_reader(Some(5));

        assert_eq!(a.read(None).await.unwrap().data(), Some(&b"012"[..]));
        assert_eq!(b.read(None).await.unwrap().data(), Some(&b"01234"[..]));
        assert_eq!(a.read(None).await.unwrap().data(), Some(&b"345"[..]));
        assert_eq!(b.read(None).await.unwrap().data(), Some(&b"56789"[..]));
    }

    #[tokio::test]
    async fn test_lock_contention_gives_up() {
        let file = fixture(b"data");
        let policy = LockPolicy {
            min_jitter: Duration::from_millis(1),
            max_jitter: Duration::from_millis(3),
            budget: Duration::from_millis(60),
        };
        let reader = FileMultiReader::open(file.path(), StopSignal::new())
            .await
            .unwrap()
            .with_lock_policy(policy);

        let held = reader.shared.file.lock().await;
        let started = std::time::Instant::now();
        let err = reader.read_at(0, ReadMode::Bytes(4)).await.unwrap_err();
        assert_eq!(err.category(), "LOCK");
        let waited = started.elapsed();
        assert!(waited >= policy.budget);
        assert!(waited < policy.budget + policy.max_jitter + Duration::from_millis(50));
        assert!(reader.contention_count() >= 2);
        drop(held);

        let (chunk, next) = reader.read_at(0, ReadMode::Bytes(4)).await.unwrap();
        assert_eq!(chunk, Chunk::Data(b"data".to_vec()));
        assert_eq!(next, 4);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let file = fixture(b"data");
        let reader = FileMultiReader::open(file.path(), StopSignal::new()).await.unwrap();
        let mut cursor = reader.get_reader(None);

        reader.close().await.unwrap();
        reader.close().await.unwrap();
        assert_eq!(cursor.read(None).await.unwrap_err().category(), "IO");
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = LockPolicy::default();
        for _ in 0..100 {
            let pause = policy.jitter();
            assert!(pause >= Duration::from_millis(5));
            assert!(pause <= Duration::from_millis(20));
        }
    }
}
