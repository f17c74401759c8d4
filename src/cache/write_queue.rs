//! Single-consumer queue that persists snapshots one at a time.
//!
//! Jobs run strictly in submission order. Job `n + 1` is not started until
//! job `n` has finished, successfully or not. A job's bytes are rendered
//! when its turn comes, so it can reflect how every earlier job ended.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::{mpsc, oneshot};

use crate::debug_log::{self, TimedOp};
use crate::storage::StoreFs;

/// Outcome of one persisted write: the file's mtime right after the write.
pub type WriteAck = io::Result<SystemTime>;

type Render = Box<dyn FnOnce() -> io::Result<Vec<u8>> + Send>;
type OnDone = Box<dyn FnOnce(&WriteAck) + Send>;

struct WriteJob {
    seq: u64,
    path: PathBuf,
    render: Render,
    on_done: OnDone,
    ack: oneshot::Sender<WriteAck>,
}

#[derive(Debug, thiserror::Error)]
#[error("write queue is closed")]
pub struct QueueClosed;

pub struct WriteQueue {
    tx: mpsc::UnboundedSender<WriteJob>,
    next_seq: parking_lot::Mutex<u64>,
}

impl WriteQueue {
    /// Spawns the consumer task. Must be called from within a tokio runtime.
    pub fn spawn(fs: Arc<dyn StoreFs>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain(fs, rx));
        Self {
            tx,
            next_seq: parking_lot::Mutex::new(0),
        }
    }

    /// Queue a write to `path` after every earlier job.
    ///
    /// `render` produces the bytes and is called on the consumer task once
    /// all earlier jobs have finished; an error from it fails this job
    /// without touching the file. Enqueueing never blocks; await the
    /// returned receiver for the result. `on_done` runs on the consumer task
    /// before the next job starts, even if the receiver has been dropped. It
    /// is never called when the job is rejected.
    pub fn submit<R, F>(
        &self,
        path: PathBuf,
        render: R,
        on_done: F,
    ) -> Result<oneshot::Receiver<WriteAck>, QueueClosed>
    where
        R: FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
        F: FnOnce(&WriteAck) + Send + 'static,
    {
        let (ack, done) = oneshot::channel();
        let seq = {
            let mut next = self.next_seq.lock();
            *next += 1;
            *next
        };
        let job = WriteJob {
            seq,
            path,
            render: Box::new(render),
            on_done: Box::new(on_done),
            ack,
        };
        // Only fails once the consumer is gone, i.e. the runtime is shutting down.
        self.tx.send(job).map_err(|_| QueueClosed)?;
        Ok(done)
    }
}

async fn drain(fs: Arc<dyn StoreFs>, mut rx: mpsc::UnboundedReceiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        let WriteJob {
            seq,
            path,
            render,
            on_done,
            ack,
        } = job;

        let result = match render() {
            Ok(contents) => {
                let _timer = TimedOp::start(
                    "WRITE",
                    "persist",
                    format!("#{seq} {} bytes to {}", contents.len(), path.display()),
                );
                persist(fs.as_ref(), &path, &contents).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            debug_log::log("WRITE", "FAILED", &format!("#{seq}: {e}"));
        }
        on_done(&result);
        // The submitter may have gone away; the write still happened.
        let _ = ack.send(result);
    }
}

async fn persist(fs: &dyn StoreFs, path: &Path, contents: &[u8]) -> WriteAck {
    fs.write(path, contents).await?;
    fs.modified(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TokioFs;

    #[tokio::test]
    async fn writes_apply_in_submission_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.json");
        let queue = WriteQueue::spawn(Arc::new(TokioFs));

        let acks: Vec<_> = (0..5)
            .map(|i| {
                let render = move || Ok(format!("[{i}]").into_bytes());
                queue.submit(path.clone(), render, |_| {})
            })
            .map(|ack| ack.expect("queue open"))
            .collect();
        for ack in acks {
            ack.await.expect("ack").expect("write");
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[4]");
    }

    #[tokio::test]
    async fn failed_write_does_not_stall_the_queue() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bad = dir.path().join("missing").join("items.json");
        let good = dir.path().join("items.json");
        let queue = WriteQueue::spawn(Arc::new(TokioFs));

        let first = queue.submit(bad, || Ok(b"[]".to_vec()), |_| {}).unwrap();
        let second = queue
            .submit(good.clone(), || Ok(b"[1]".to_vec()), |_| {})
            .unwrap();

        assert!(first.await.expect("ack").is_err());
        second.await.expect("ack").expect("write");
        assert_eq!(std::fs::read_to_string(&good).unwrap(), "[1]");
    }

    #[tokio::test]
    async fn completion_hook_runs_without_a_listener() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.json");
        let queue = WriteQueue::spawn(Arc::new(TokioFs));
        let (seen_tx, seen_rx) = oneshot::channel();

        let ack = queue
            .submit(path.clone(), || Ok(b"[]".to_vec()), move |result| {
                let _ = seen_tx.send(result.is_ok());
            })
            .unwrap();
        drop(ack);

        assert!(seen_rx.await.expect("hook ran"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn render_sees_earlier_outcomes_and_its_failure_skips_the_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("items.json");
        let queue = WriteQueue::spawn(Arc::new(TokioFs));
        let outcomes = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let record = Arc::clone(&outcomes);
        let first = queue
            .submit(path.clone(), || Ok(b"[1]".to_vec()), move |result| {
                record.lock().push(result.is_ok());
            })
            .unwrap();
        let seen = Arc::clone(&outcomes);
        let second = queue
            .submit(
                path.clone(),
                move || {
                    assert_eq!(*seen.lock(), vec![true], "first job already finished");
                    Err(io::Error::other("nothing to write"))
                },
                |_| {},
            )
            .unwrap();

        first.await.expect("ack").expect("write");
        assert!(second.await.expect("ack").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]");
    }
}
