//! Ordered panorama list with a single-flight, FIFO processing queue.
//!
//! After every mutation the collection re-evaluates its processing slot: when the slot is
//! empty, the first queued entry in collection order is started and handed to the processor.
//! The slot holds the running panorama and its cancellation token and is released only when
//! the processor reports the job's completion.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::pipeline::{
    CancellationToken, PanoramaProcessor, ProcessingJob, ProcessingOutcome, ProcessingUpdate,
    UpdateEnvelope, UpdateSink,
};
use crate::state::Status;
use crate::types::{ImageDimensions, PanoramaId};

use super::{LinkHotspot, PanoramaEntry, PanoramaError, SourceFiles};

/// Aggregate notifications raised by the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEvent {
    /// The list or any entry's processing state changed.
    Changed,
    /// Processing of the entry failed (cancellations are not reported here).
    ProcessingFailed(PanoramaId),
    SelectedPanoramaChanged(Option<PanoramaId>),
}

/// Result of a removal request.
#[derive(Debug)]
pub enum Removal {
    Removed(Box<PanoramaEntry>),
    /// Confirmation was required and declined; nothing changed.
    Declined,
}

#[derive(Debug)]
struct ActiveJob {
    panorama: PanoramaId,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct PanoramaCollection {
    entries: Vec<PanoramaEntry>,
    selected: Option<PanoramaId>,
    processing: Option<ActiveJob>,
    processor: Box<dyn PanoramaProcessor>,
    updates_tx: Sender<UpdateEnvelope>,
    updates_rx: Receiver<UpdateEnvelope>,
    next_id: u64,
    events: Vec<CollectionEvent>,
}

impl PanoramaCollection {
    pub fn new(processor: impl PanoramaProcessor + 'static) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel();
        Self {
            entries: Vec::new(),
            selected: None,
            processing: None,
            processor: Box::new(processor),
            updates_tx,
            updates_rx,
            next_id: 0,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in authoring order.
    pub fn entries(&self) -> &[PanoramaEntry] {
        &self.entries
    }

    pub fn get(&self, id: PanoramaId) -> Option<&PanoramaEntry> {
        self.entries.iter().find(|entry| entry.id() == id)
    }

    /// Mutable access for author edits (hotspots, view, name).
    pub fn get_mut(&mut self, id: PanoramaId) -> Option<&mut PanoramaEntry> {
        self.entries.iter_mut().find(|entry| entry.id() == id)
    }

    pub fn position(&self, id: PanoramaId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    pub fn contains(&self, id: PanoramaId) -> bool {
        self.position(id).is_some()
    }

    /// Positional id (`<index>-<slug>`), or `None` for panoramas not in the collection.
    pub fn unique_id(&self, id: PanoramaId) -> Option<String> {
        let index = self.position(id)?;
        Some(self.entries[index].unique_id_at(Some(index)))
    }

    /// Whether the hotspot's target is still part of the collection.
    pub fn has_valid_target(&self, hotspot: &LinkHotspot) -> bool {
        self.contains(hotspot.target())
    }

    /// Append a panorama. It is queued, started right away if the slot is free, and selected
    /// when nothing else is.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        sources: SourceFiles,
        dimensions: ImageDimensions,
    ) -> PanoramaId {
        let index = self.entries.len();
        self.insert(index, name, sources, dimensions)
    }

    /// Insert a panorama at `index` (clamped to the end of the list).
    pub fn insert(
        &mut self,
        index: usize,
        name: impl Into<String>,
        sources: SourceFiles,
        dimensions: ImageDimensions,
    ) -> PanoramaId {
        let id = PanoramaId::new(self.next_id);
        self.next_id += 1;

        let entry = PanoramaEntry::new(id, name, sources, dimensions);
        debug!(panorama = %id, name = entry.name(), kind = entry.kind().as_str(), "panorama added");
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);

        self.events.push(CollectionEvent::Changed);
        self.handle_list_change();

        if self.selected.is_none() {
            self.set_selected(Some(id));
        }
        id
    }

    /// Removing a started or successfully processed panorama needs confirmation.
    pub fn requires_confirmation(&self, id: PanoramaId) -> bool {
        self.get(id).is_some_and(|entry| {
            matches!(entry.state().status(), Status::Started | Status::Successful)
        })
    }

    /// Remove a panorama. `confirm` is consulted only when [`Self::requires_confirmation`].
    ///
    /// Removing the panorama being processed cancels its job; the slot frees once the
    /// processor acknowledges.
    pub fn remove(
        &mut self,
        id: PanoramaId,
        confirm: impl FnOnce(&PanoramaEntry) -> bool,
    ) -> Result<Removal, PanoramaError> {
        let index = self.position(id).ok_or(PanoramaError::UnknownPanorama(id))?;

        if self.requires_confirmation(id) && !confirm(&self.entries[index]) {
            debug!(panorama = %id, "removal declined");
            return Ok(Removal::Declined);
        }

        let entry = self.entries.remove(index);

        if let Some(active) = self.processing.as_ref().filter(|active| active.panorama == id) {
            if active.cancel.cancel() {
                info!(panorama = %id, "cancelling in-flight processing of removed panorama");
            }
        }

        self.events.push(CollectionEvent::Changed);
        self.handle_list_change();

        if self.selected == Some(id) {
            let next = self.entries.first().map(PanoramaEntry::id);
            self.set_selected(next);
        }

        Ok(Removal::Removed(Box::new(entry)))
    }

    pub fn select(&mut self, id: PanoramaId) -> Result<(), PanoramaError> {
        if !self.contains(id) {
            return Err(PanoramaError::UnknownPanorama(id));
        }
        self.set_selected(Some(id));
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.set_selected(None);
    }

    pub fn selected(&self) -> Option<PanoramaId> {
        self.selected
    }

    pub fn is_selected(&self, id: PanoramaId) -> bool {
        self.selected == Some(id)
    }

    /// Panorama currently occupying the processing slot, if any.
    pub fn processing(&self) -> Option<PanoramaId> {
        self.processing.as_ref().map(|active| active.panorama)
    }

    /// True when nothing is processing and nothing is waiting.
    pub fn is_settled(&self) -> bool {
        self.processing.is_none() && !self.entries.iter().any(|entry| entry.state().is_queued())
    }

    /// Take every event raised since the last drain.
    pub fn drain_events(&mut self) -> Vec<CollectionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Apply every update already delivered by the processor. Returns how many were applied.
    pub fn pump(&mut self) -> Result<usize, PanoramaError> {
        let mut applied = 0;
        while let Ok(envelope) = self.updates_rx.try_recv() {
            self.apply(envelope)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Wait up to `timeout` for one update and apply it. Returns `false` on timeout.
    pub fn pump_blocking(&mut self, timeout: Duration) -> Result<bool, PanoramaError> {
        match self.updates_rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.apply(envelope)?;
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    /// Apply one processor update. Updates for panoramas outside the processing slot, or for
    /// panoramas removed mid-flight, are discarded.
    pub fn apply(&mut self, envelope: UpdateEnvelope) -> Result<(), PanoramaError> {
        let UpdateEnvelope { panorama, update } = envelope;
        if self.processing() != Some(panorama) {
            debug!(panorama = %panorama, "discarding update for a panorama that is not processing");
            return Ok(());
        }

        match update {
            ProcessingUpdate::Finished(outcome) => {
                self.finish(panorama, outcome);
                Ok(())
            }
            ProcessingUpdate::Tile { coord, blob } => match self.get_mut(panorama) {
                Some(entry) => entry.add_tile(coord.level, coord.face, coord.x, coord.y, blob),
                None => Ok(()),
            },
            ProcessingUpdate::Levels { levels, options } => match self.get_mut(panorama) {
                Some(entry) => entry.set_levels(levels, options),
                None => Ok(()),
            },
            ProcessingUpdate::Preview(blob) => match self.get_mut(panorama) {
                Some(entry) => entry.set_cube_map_preview(blob),
                None => Ok(()),
            },
        }
    }

    fn finish(&mut self, panorama: PanoramaId, outcome: ProcessingOutcome) {
        self.processing = None;

        match self.entries.iter_mut().find(|entry| entry.id() == panorama) {
            Some(entry) => {
                let mut failed = false;
                let transition = match outcome {
                    ProcessingOutcome::Success if entry.levels().is_none() => {
                        failed = true;
                        entry.state_mut().failed(json!({
                            "message": "processor finished without assigning levels",
                        }))
                    }
                    ProcessingOutcome::Success => {
                        let tiles = entry.tiles().len();
                        let bytes = entry.tiles().bytes_used();
                        info!(panorama = %panorama, tiles, bytes, "panorama processed");
                        entry.state_mut().successful_with(json!({ "tileNum": tiles, "byteLength": bytes }))
                    }
                    ProcessingOutcome::Cancelled => {
                        info!(panorama = %panorama, "panorama processing cancelled");
                        entry.state_mut().cancelled()
                    }
                    ProcessingOutcome::Failed(detail) => {
                        failed = true;
                        warn!(panorama = %panorama, error = %detail, "panorama processing failed");
                        let detail = serde_json::to_value(&detail).unwrap_or_else(|_| json!({}));
                        entry.state_mut().failed(detail)
                    }
                };

                if let Err(err) = transition {
                    warn!(panorama = %panorama, %err, "ignoring completion that does not fit the state");
                }
                self.events.push(CollectionEvent::Changed);
                if failed {
                    self.events.push(CollectionEvent::ProcessingFailed(panorama));
                }
            }
            None => debug!(panorama = %panorama, "removed panorama released the processing slot"),
        }

        self.handle_list_change();
    }

    fn handle_list_change(&mut self) {
        if self.processing.is_some() {
            return;
        }

        let Some(entry) = self.entries.iter_mut().find(|entry| entry.state().is_queued()) else {
            return;
        };

        if let Err(err) = entry.state_mut().started() {
            warn!(panorama = %entry.id(), %err, "could not start queued panorama");
            return;
        }

        let cancel = CancellationToken::new();
        let job = ProcessingJob {
            panorama: entry.id(),
            name: entry.name().to_string(),
            sources: entry.sources().clone(),
            dimensions: entry.dimensions(),
            cancel: cancel.clone(),
            sink: UpdateSink::new(entry.id(), self.updates_tx.clone()),
        };
        info!(panorama = %job.panorama, name = %job.name, "processing panorama");

        self.processing = Some(ActiveJob { panorama: job.panorama, cancel });
        self.events.push(CollectionEvent::Changed);
        self.processor.process(job);
    }

    fn set_selected(&mut self, id: Option<PanoramaId>) {
        self.selected = id;
        self.events.push(CollectionEvent::SelectedPanoramaChanged(id));
    }
}
