//! Debug logging for tracing cache hits, coalesced loads and queued writes.
//!
//! Enable by setting environment variable: CATALOG_DEBUG_LOG=1
//! Logs are written to catalog-debug.log in the system temp directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);
static START_TIME: OnceLock<Instant> = OnceLock::new();
static LOG_FILE: OnceLock<parking_lot::Mutex<std::fs::File>> = OnceLock::new();

pub fn log_path() -> PathBuf {
    std::env::temp_dir().join("catalog-debug.log")
}

/// Initialize debug logging. Call once at startup.
pub fn init() {
    if std::env::var("CATALOG_DEBUG_LOG").is_err() {
        return;
    }
    let opened = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path());
    match opened {
        Ok(file) => {
            START_TIME.get_or_init(Instant::now);
            LOG_FILE.get_or_init(|| parking_lot::Mutex::new(file));
            ENABLED.store(true, Ordering::SeqCst);
            log("DEBUG", "init", "Debug logging initialized");
        }
        Err(e) => eprintln!("Warning: could not open debug log {}: {e}", log_path().display()),
    }
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Log a debug message with timestamp and thread ID.
pub fn log(category: &str, action: &str, detail: &str) {
    if !is_enabled() {
        return;
    }

    let elapsed = START_TIME
        .get()
        .map(|s| s.elapsed().as_millis())
        .unwrap_or(0);
    let thread_id = std::thread::current().id();

    let msg = format!(
        "[{:>8}ms] [{:?}] [{}] {} - {}\n",
        elapsed, thread_id, category, action, detail
    );

    if let Some(file_mutex) = LOG_FILE.get() {
        let mut file = file_mutex.lock();
        let _ = file.write_all(msg.as_bytes());
        let _ = file.flush();
    }
}

/// Records how long a load or write took when dropped, including on early return.
pub struct TimedOp {
    category: &'static str,
    action: &'static str,
    detail: String,
    started: Instant,
}

impl TimedOp {
    pub fn start(category: &'static str, action: &'static str, detail: String) -> Self {
        log(category, action, &detail);
        Self {
            category,
            action,
            detail,
            started: Instant::now(),
        }
    }
}

impl Drop for TimedOp {
    fn drop(&mut self) {
        if is_enabled() {
            let detail = format!(
                "{} ({}us)",
                self.detail,
                self.started.elapsed().as_micros()
            );
            log(self.category, &format!("{} DONE", self.action), &detail);
        }
    }
}
