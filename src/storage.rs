use std::io;
use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;

/// Filesystem operations the caches depend on.
///
/// These are the only places a cache operation suspends; everything else
/// (parsing, filtering, aggregation) runs to completion in between.
#[async_trait]
pub trait StoreFs: Send + Sync {
    /// Last modification time of the file at `path`
    async fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Full contents of the file at `path`
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the contents of the file at `path`
    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// `StoreFs` backed by `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFs;

#[async_trait]
impl StoreFs for TokioFs {
    async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        tokio::fs::metadata(path).await?.modified()
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, contents).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Wraps `TokioFs`, counting physical reads/writes. Optionally stretches
    /// each read so concurrent callers overlap, fails the first few writes,
    /// or moves the file's mtime forward right after each read.
    #[derive(Debug, Default)]
    pub struct CountingFs {
        reads: AtomicUsize,
        writes: AtomicUsize,
        read_delay: Option<Duration>,
        write_delay: Option<Duration>,
        failing_writes: AtomicUsize,
        touch_after_read: bool,
    }

    impl CountingFs {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn with_read_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                read_delay: Some(delay),
                ..Self::default()
            })
        }

        /// The first `count` writes fail after `delay`, without touching the file.
        pub fn failing_first_writes(count: usize, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                write_delay: Some(delay),
                failing_writes: AtomicUsize::new(count),
                ..Self::default()
            })
        }

        /// Every read is followed by an mtime bump, as if a writer raced it.
        pub fn touching_after_read() -> Arc<Self> {
            Arc::new(Self {
                touch_after_read: true,
                ..Self::default()
            })
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StoreFs for CountingFs {
        async fn modified(&self, path: &Path) -> io::Result<SystemTime> {
            TokioFs.modified(path).await
        }

        async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.read_delay {
                tokio::time::sleep(delay).await;
            }
            let contents = TokioFs.read(path).await?;
            if self.touch_after_read {
                let bumped = TokioFs.modified(path).await? + Duration::from_secs(5);
                std::fs::File::options()
                    .write(true)
                    .open(path)?
                    .set_modified(bumped)?;
            }
            Ok(contents)
        }

        async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.write_delay {
                tokio::time::sleep(delay).await;
            }
            let fail = self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if fail {
                return Err(io::Error::other("disk full"));
            }
            TokioFs.write(path, contents).await
        }
    }
}
