//! Detection worker
//!
//! Drains the ingestion queue into bounded batches and runs the detector
//! over each batch. Per-capture results are unpacked into individual
//! detections and forwarded to the geolocation queue. A failed detector
//! call discards only the batch that triggered it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::detector::{DetectorError, ObjectDetector};

use super::{GeoMessage, IngestMessage, TaggedDetection};

/// Detection worker loop.
///
/// Blocks for the first capture of a batch, then drains whatever is already
/// queued up to `batch_size` without waiting. A shutdown sentinel observed
/// mid-drain still lets the in-progress batch run, so nothing that was
/// dequeued before shutdown is lost.
pub(crate) fn run(
    ingest_rx: Receiver<IngestMessage>,
    geo_tx: Sender<GeoMessage>,
    detector: Arc<dyn ObjectDetector>,
    batch_size: usize,
    cancel: Arc<AtomicBool>,
) {
    loop {
        let mut shutdown = false;
        let mut batch: Vec<String> = Vec::with_capacity(batch_size);

        match ingest_rx.recv() {
            Ok(IngestMessage::Capture(capture)) => batch.push(capture),
            Ok(IngestMessage::Shutdown) | Err(_) => shutdown = true,
        }

        while !shutdown && batch.len() < batch_size {
            match ingest_rx.try_recv() {
                Ok(IngestMessage::Capture(capture)) => batch.push(capture),
                Ok(IngestMessage::Shutdown) => shutdown = true,
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            dispatch_batch(&batch, detector.as_ref(), &geo_tx);
        }

        if shutdown || cancel.load(Ordering::SeqCst) {
            return;
        }
    }
}

fn dispatch_batch(batch: &[String], detector: &dyn ObjectDetector, geo_tx: &Sender<GeoMessage>) {
    match detector.detect_batch(batch) {
        Ok(results) if results.len() == batch.len() => {
            let mut forwarded = 0usize;
            for (capture, detections) in batch.iter().zip(results) {
                for detection in detections {
                    let message = GeoMessage::Detection(TaggedDetection {
                        capture: capture.clone(),
                        detection,
                    });
                    if geo_tx.send(message).is_err() {
                        return;
                    }
                    forwarded += 1;
                }
            }
            debug!(captures = batch.len(), forwarded, "batch dispatched");
        }
        Ok(results) => {
            let error = DetectorError::ShapeMismatch {
                expected: batch.len(),
                got: results.len(),
            };
            warn!(%error, "batch discarded");
        }
        Err(error) => {
            warn!(%error, captures = batch.len(), "detector call failed, batch discarded");
        }
    }
}
