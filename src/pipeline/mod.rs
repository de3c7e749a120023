//! Concurrent capture-to-fix pipeline
//!
//! Three worker threads chained by channels: a watcher that notices new
//! captures, a detection worker that batches them through the object
//! detector, and a geolocation worker that turns detections into stored
//! geographic fixes. The controller owns the threads and shuts them down
//! cooperatively through a shared flag plus per-queue sentinels.

pub mod detection;
pub mod geolocation;
pub mod watcher;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::core::DEFAULT_BATCH_SIZE;
use crate::detector::{Detection, ObjectDetector};
use crate::geodesy::CameraIntrinsics;
use crate::storage::{PoseSource, TargetStore};

pub use geolocation::{geolocate, GeolocateError};
pub use watcher::{CaptureSource, FsCaptureSource, Watcher};

/// Message on the ingestion queue.
#[derive(Debug, Clone)]
pub enum IngestMessage {
    Capture(String),
    Shutdown,
}

/// A detection still tied to the capture it came from.
#[derive(Debug, Clone)]
pub struct TaggedDetection {
    pub capture: String,
    pub detection: Detection,
}

/// Message on the geolocation queue.
#[derive(Debug, Clone)]
pub enum GeoMessage {
    Detection(TaggedDetection),
    Shutdown,
}

/// Tunable pipeline behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on captures handed to the detector in one call.
    pub batch_size: usize,
    /// Delay between capture source polls.
    pub poll_interval: Duration,
    /// Longest the controller waits for the workers to wind down.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("{worker} worker did not stop within the shutdown timeout")]
    ShutdownTimeout { worker: &'static str },

    #[error("{worker} worker panicked")]
    WorkerPanicked { worker: &'static str },
}

struct Workers {
    watcher: JoinHandle<()>,
    detection: JoinHandle<()>,
    geolocation: JoinHandle<()>,
}

/// Owner of the three pipeline threads.
///
/// `start` and `stop` may be called repeatedly; the watcher watermark
/// survives restarts so captures are never re-detected.
pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn CaptureSource>,
    detector: Arc<dyn ObjectDetector>,
    poses: Arc<dyn PoseSource>,
    store: Arc<TargetStore>,
    intrinsics: CameraIntrinsics,
    cancel: Arc<AtomicBool>,
    watermark: Arc<AtomicUsize>,
    ingest_tx: Option<Sender<IngestMessage>>,
    geo_tx: Option<Sender<GeoMessage>>,
    workers: Option<Workers>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn CaptureSource>,
        detector: Arc<dyn ObjectDetector>,
        poses: Arc<dyn PoseSource>,
        store: Arc<TargetStore>,
        intrinsics: CameraIntrinsics,
    ) -> Self {
        Self {
            config,
            source,
            detector,
            poses,
            store,
            intrinsics,
            cancel: Arc::new(AtomicBool::new(false)),
            watermark: Arc::new(AtomicUsize::new(0)),
            ingest_tx: None,
            geo_tx: None,
            workers: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.workers.is_some()
    }

    /// Spawn the watcher, detection, and geolocation workers.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.workers.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.cancel.store(false, Ordering::SeqCst);

        let (ingest_tx, ingest_rx) = unbounded();
        let (geo_tx, geo_rx) = unbounded();

        let poller = Watcher::with_watermark(self.source.clone(), self.watermark.clone());
        let watcher = {
            let tx = ingest_tx.clone();
            let cancel = self.cancel.clone();
            let interval = self.config.poll_interval;
            thread::spawn(move || watcher::run(poller, tx, cancel, interval))
        };

        let detection = {
            let tx = geo_tx.clone();
            let detector = self.detector.clone();
            let cancel = self.cancel.clone();
            let batch_size = self.config.batch_size;
            thread::spawn(move || detection::run(ingest_rx, tx, detector, batch_size, cancel))
        };

        let geolocation = {
            let poses = self.poses.clone();
            let store = self.store.clone();
            let intrinsics = self.intrinsics;
            thread::spawn(move || geolocation::run(geo_rx, poses, store, intrinsics))
        };

        self.ingest_tx = Some(ingest_tx);
        self.geo_tx = Some(geo_tx);
        self.workers = Some(Workers {
            watcher,
            detection,
            geolocation,
        });
        info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "pipeline started"
        );
        Ok(())
    }

    /// Stop all workers within the configured timeout.
    ///
    /// The ingestion sentinel goes out first and the upstream workers are
    /// joined before the geolocation sentinel is sent, so every detection
    /// forwarded during wind-down is still geolocated. Idempotent when not
    /// running.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        let Some(workers) = self.workers.take() else {
            return Ok(());
        };

        self.cancel.store(true, Ordering::SeqCst);
        if let Some(tx) = self.ingest_tx.take() {
            let _ = tx.send(IngestMessage::Shutdown);
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        let mut result = join_within(workers.watcher, "watcher", deadline);
        if let Err(error) = join_within(workers.detection, "detection", deadline) {
            result = result.and(Err(error));
        }

        // Upstream is quiet now, so this sentinel is the last message
        if let Some(tx) = self.geo_tx.take() {
            let _ = tx.send(GeoMessage::Shutdown);
        }
        if let Err(error) = join_within(workers.geolocation, "geolocation", deadline) {
            result = result.and(Err(error));
        }

        // Armed again for a future start
        self.cancel.store(false, Ordering::SeqCst);
        info!("pipeline stopped");
        result
    }
}

/// Route worker tracing through the test harness's captured output.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn join_within(
    handle: JoinHandle<()>,
    worker: &'static str,
    deadline: Instant,
) -> Result<(), PipelineError> {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return Err(PipelineError::ShutdownTimeout { worker });
        }
        thread::sleep(Duration::from_millis(5));
    }
    handle
        .join()
        .map_err(|_| PipelineError::WorkerPanicked { worker })
}
