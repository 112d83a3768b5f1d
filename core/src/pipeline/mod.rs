//! Image-processing contract between the panorama collection and tile producers.
//!
//! The collection hands a [`ProcessingJob`] to a [`PanoramaProcessor`] whenever its processing
//! slot is free. The processor streams [`ProcessingUpdate`]s back through the job's
//! [`UpdateSink`] and must end with exactly one [`ProcessingOutcome`]. The sink enforces this:
//! [`UpdateSink::finish`] consumes it, and a sink dropped without finishing reports a failure.

pub mod plan;
pub mod project;
pub mod resize;
pub mod tiler;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

use serde::Serialize;

use crate::panorama::SourceFiles;
use crate::tile::TileBlob;
use crate::types::{Face, ImageDimensions, Level, LevelOptions, PanoramaId, TileCoord};

pub type Result<T> = crate::Result<T>;

/// Cooperative cancellation flag shared between the collection and a running job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requests: Arc<AtomicUsize>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` for the first request only.
    pub fn cancel(&self) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst) == 0
    }

    pub fn is_cancelled(&self) -> bool {
        self.requests.load(Ordering::SeqCst) > 0
    }

    /// How many times cancellation was requested.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

/// Structured description of a processing failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureDetail {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl FailureDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), causes: Vec::new() }
    }
}

impl From<&anyhow::Error> for FailureDetail {
    fn from(err: &anyhow::Error) -> Self {
        Self {
            message: err.to_string(),
            causes: err.chain().skip(1).map(|cause| cause.to_string()).collect(),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        for cause in &self.causes {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Success,
    Cancelled,
    Failed(FailureDetail),
}

/// A single message from a processor about the job it is running.
#[derive(Debug, Clone)]
pub enum ProcessingUpdate {
    Tile { coord: TileCoord, blob: TileBlob },
    Levels { levels: Vec<Level>, options: LevelOptions },
    Preview(TileBlob),
    Finished(ProcessingOutcome),
}

/// Update tagged with the panorama it belongs to.
#[derive(Debug, Clone)]
pub struct UpdateEnvelope {
    pub panorama: PanoramaId,
    pub update: ProcessingUpdate,
}

/// Channel end handed to a processor for one job.
#[derive(Debug)]
pub struct UpdateSink {
    panorama: PanoramaId,
    tx: Sender<UpdateEnvelope>,
    finished: bool,
}

impl UpdateSink {
    pub(crate) fn new(panorama: PanoramaId, tx: Sender<UpdateEnvelope>) -> Self {
        Self { panorama, tx, finished: false }
    }

    pub fn panorama(&self) -> PanoramaId {
        self.panorama
    }

    /// Deliver an encoded tile. Returns `false` once the collection is gone.
    pub fn tile(&self, level: u32, face: Face, x: u32, y: u32, blob: TileBlob) -> bool {
        self.send(ProcessingUpdate::Tile { coord: TileCoord::new(level, face, x, y), blob })
    }

    pub fn levels(&self, levels: Vec<Level>, options: LevelOptions) -> bool {
        self.send(ProcessingUpdate::Levels { levels, options })
    }

    pub fn preview(&self, blob: TileBlob) -> bool {
        self.send(ProcessingUpdate::Preview(blob))
    }

    /// Report the job's single completion.
    pub fn finish(mut self, outcome: ProcessingOutcome) {
        self.finished = true;
        self.send(ProcessingUpdate::Finished(outcome));
    }

    fn send(&self, update: ProcessingUpdate) -> bool {
        self.tx.send(UpdateEnvelope { panorama: self.panorama, update }).is_ok()
    }
}

impl Drop for UpdateSink {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(panorama = %self.panorama, "processor dropped its job without finishing");
            self.send(ProcessingUpdate::Finished(ProcessingOutcome::Failed(FailureDetail::new(
                "processor dropped the job",
            ))));
        }
    }
}

/// Everything a processor needs to derive the tile pyramid of one panorama.
#[derive(Debug)]
pub struct ProcessingJob {
    pub panorama: PanoramaId,
    pub name: String,
    pub sources: SourceFiles,
    pub dimensions: ImageDimensions,
    pub cancel: CancellationToken,
    pub sink: UpdateSink,
}

/// Image-processing transform driven by the collection.
///
/// `process` must return promptly; the work itself may continue elsewhere as long as the
/// job's sink eventually finishes. A cancelled token must lead to
/// [`ProcessingOutcome::Cancelled`].
pub trait PanoramaProcessor: fmt::Debug {
    fn process(&mut self, job: ProcessingJob);
}

/// Processor that parks jobs for the host application to run itself.
#[derive(Debug, Clone, Default)]
pub struct DeferredProcessor {
    jobs: Arc<parking_lot::Mutex<VecDeque<ProcessingJob>>>,
}

impl DeferredProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest parked job.
    pub fn take(&self) -> Option<ProcessingJob> {
        self.jobs.lock().pop_front()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl PanoramaProcessor for DeferredProcessor {
    fn process(&mut self, job: ProcessingJob) {
        self.jobs.lock().push_back(job);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn cancellation_reports_first_request() {
        let token = CancellationToken::new();
        let shared = token.clone();
        assert!(!shared.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(shared.is_cancelled());
        assert_eq!(shared.request_count(), 2);
    }

    #[test]
    fn finishing_sends_exactly_one_completion() {
        let (tx, rx) = mpsc::channel();
        let sink = UpdateSink::new(PanoramaId::new(3), tx);
        sink.tile(0, Face::Front, 0, 0, TileBlob::from(vec![1, 2]));
        sink.finish(ProcessingOutcome::Success);

        let updates: Vec<UpdateEnvelope> = rx.try_iter().collect();
        assert_eq!(updates.len(), 2);
        assert!(matches!(
            updates[1].update,
            ProcessingUpdate::Finished(ProcessingOutcome::Success)
        ));
        assert!(updates.iter().all(|env| env.panorama == PanoramaId::new(3)));
    }

    #[test]
    fn dropped_sink_reports_failure() {
        let (tx, rx) = mpsc::channel();
        drop(UpdateSink::new(PanoramaId::new(1), tx));

        let updates: Vec<UpdateEnvelope> = rx.try_iter().collect();
        assert_eq!(updates.len(), 1);
        match &updates[0].update {
            ProcessingUpdate::Finished(ProcessingOutcome::Failed(detail)) => {
                assert!(detail.message.contains("dropped"));
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    #[test]
    fn failure_detail_keeps_error_chain() {
        let err = anyhow::anyhow!("root cause").context("decoding face");
        let detail = FailureDetail::from(&err);
        assert_eq!(detail.message, "decoding face");
        assert_eq!(detail.causes, vec!["root cause".to_string()]);
        assert_eq!(detail.to_string(), "decoding face: root cause");
    }
}
