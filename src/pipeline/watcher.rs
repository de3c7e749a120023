//! Capture arrival monitoring
//!
//! Polls a capture source on a fixed interval and emits every capture past a
//! monotonically increasing watermark exactly once, in sorted order. Capture
//! identifiers must sort consistently with arrival order; a source that
//! violates that ordering can cause missed or duplicate emission.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use super::IngestMessage;

/// Granularity of the cancellation-aware poll sleep.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Source of lexicographically sortable capture identifiers.
pub trait CaptureSource: Send + Sync {
    /// Current full listing of available captures, in any order.
    fn list(&self) -> io::Result<Vec<String>>;
}

/// Capture source backed by a directory of image files.
#[derive(Debug, Clone)]
pub struct FsCaptureSource {
    dir: PathBuf,
}

impl FsCaptureSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CaptureSource for FsCaptureSource {
    fn list(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// Watermark-tracking poller over a capture source.
///
/// The watermark is shared so a restarted pipeline resumes where the
/// previous run left off instead of re-emitting every capture.
pub struct Watcher {
    source: Arc<dyn CaptureSource>,
    watermark: Arc<AtomicUsize>,
}

impl Watcher {
    pub fn new(source: Arc<dyn CaptureSource>) -> Self {
        Self::with_watermark(source, Arc::new(AtomicUsize::new(0)))
    }

    pub fn with_watermark(source: Arc<dyn CaptureSource>, watermark: Arc<AtomicUsize>) -> Self {
        Self { source, watermark }
    }

    /// One poll: returns the captures past the watermark, sorted, and
    /// advances the watermark past them.
    pub fn poll(&self) -> io::Result<Vec<String>> {
        let mut names = self.source.list()?;
        names.sort();

        let seen = self.watermark.load(Ordering::Acquire);
        if names.len() <= seen {
            return Ok(Vec::new());
        }
        let fresh = names.split_off(seen);
        self.watermark.store(seen + fresh.len(), Ordering::Release);
        Ok(fresh)
    }
}

/// Watcher worker loop: poll, forward, sleep, until cancelled.
pub(crate) fn run(
    watcher: Watcher,
    ingest_tx: Sender<IngestMessage>,
    cancel: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    while !cancel.load(Ordering::SeqCst) {
        match watcher.poll() {
            Ok(fresh) => {
                for capture in fresh {
                    debug!(%capture, "new capture detected");
                    if ingest_tx.send(IngestMessage::Capture(capture)).is_err() {
                        return;
                    }
                }
            }
            Err(error) => warn!(%error, "capture listing failed"),
        }
        sleep_with_cancel(&cancel, poll_interval);
    }
}

fn sleep_with_cancel(cancel: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
