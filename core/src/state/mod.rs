//! Hierarchical progress tracking for long-running operations.
//!
//! A [`ProcessingState`] node tracks one unit of work through
//! `queued → started → {successful | failed | cancelled}`. Nodes own an ordered list of child
//! nodes for sub-steps. Each node has its own change channel; nothing bubbles to the parent on
//! its own, the owner of the tree decides what to forward.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Queued,
    Started,
    Successful,
    Failed,
    Cancelled,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Successful | Status::Failed | Status::Cancelled)
    }

    fn can_move_to(self, next: Status) -> bool {
        match (self, next) {
            (Status::Queued, Status::Started) => true,
            (Status::Started, next) => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Started => "started",
            Status::Successful => "successful",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Illegal status transition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("processing state {kind:?} cannot move from {from} to {to}")]
pub struct StateError {
    pub kind: String,
    pub from: Status,
    pub to: Status,
}

/// Notification delivered to subscribers after every transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub kind: String,
    pub status: Status,
    pub metadata: Value,
}

/// Serializable copy of a state tree, detached from any subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub kind: String,
    pub status: Status,
    pub metadata: Value,
    pub children: Vec<StateSnapshot>,
}

#[derive(Debug)]
pub struct ProcessingState {
    kind: String,
    metadata: Map<String, Value>,
    status: Status,
    children: Vec<ProcessingState>,
    subscribers: Vec<Sender<StateChange>>,
}

impl ProcessingState {
    /// Create a queued node. Non-object metadata is stored under `"value"`.
    pub fn new(kind: impl Into<String>, metadata: Value) -> Self {
        let mut payload = Map::new();
        merge_into(&mut payload, "value", metadata);
        Self {
            kind: kind.into(),
            metadata: payload,
            status: Status::Queued,
            children: Vec::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn children(&self) -> &[ProcessingState] {
        &self.children
    }

    /// First child with the given kind.
    pub fn child(&self, kind: &str) -> Option<&ProcessingState> {
        self.children.iter().find(|child| child.kind == kind)
    }

    pub fn child_mut(&mut self, kind: &str) -> Option<&mut ProcessingState> {
        self.children.iter_mut().find(|child| child.kind == kind)
    }

    /// Append a queued child node and return it for further transitions.
    pub fn add_child(&mut self, kind: impl Into<String>) -> &mut ProcessingState {
        self.children.push(ProcessingState::new(kind, Value::Null));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Open a channel receiving every future transition of this node (not its children).
    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn started(&mut self) -> Result<&mut Self, StateError> {
        self.transition(Status::Started, None)
    }

    pub fn successful(&mut self) -> Result<&mut Self, StateError> {
        self.transition(Status::Successful, None)
    }

    /// Mark successful and merge `result` into the metadata payload.
    pub fn successful_with(&mut self, result: Value) -> Result<&mut Self, StateError> {
        self.transition(Status::Successful, Some(("result", result)))
    }

    /// Mark failed, recording `error` under the `"error"` key.
    pub fn failed(&mut self, error: Value) -> Result<&mut Self, StateError> {
        self.transition(Status::Failed, Some(("error", error)))
    }

    pub fn cancelled(&mut self) -> Result<&mut Self, StateError> {
        self.transition(Status::Cancelled, None)
    }

    pub fn is_queued(&self) -> bool {
        self.status == Status::Queued
    }

    pub fn is_started(&self) -> bool {
        self.status == Status::Started
    }

    pub fn is_successful(&self) -> bool {
        self.status == Status::Successful
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == Status::Cancelled
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            kind: self.kind.clone(),
            status: self.status,
            metadata: Value::Object(self.metadata.clone()),
            children: self.children.iter().map(ProcessingState::snapshot).collect(),
        }
    }

    fn transition(
        &mut self,
        next: Status,
        metadata: Option<(&str, Value)>,
    ) -> Result<&mut Self, StateError> {
        if !self.status.can_move_to(next) {
            return Err(StateError { kind: self.kind.clone(), from: self.status, to: next });
        }

        self.status = next;
        if let Some((key, value)) = metadata {
            merge_into(&mut self.metadata, key, value);
        }
        tracing::trace!(target: "state", kind = %self.kind, status = %next, "processing state changed");
        self.notify();
        Ok(self)
    }

    fn notify(&mut self) {
        if self.subscribers.is_empty() {
            return;
        }
        let change = StateChange {
            kind: self.kind.clone(),
            status: self.status,
            metadata: Value::Object(self.metadata.clone()),
        };
        // Receivers that went away are pruned.
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

fn merge_into(target: &mut Map<String, Value>, key: &str, value: Value) {
    match value {
        Value::Null => {}
        Value::Object(fields) if key != "error" => target.extend(fields),
        other => {
            target.insert(key.to_string(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn follows_the_happy_path() {
        let mut state = ProcessingState::new("panorama", json!({ "name": "Lobby" }));
        assert!(state.is_queued());

        state.started().unwrap().successful_with(json!({ "tiles": 12 })).unwrap();

        assert!(state.is_successful());
        assert_eq!(state.metadata().get("name"), Some(&json!("Lobby")));
        assert_eq!(state.metadata().get("tiles"), Some(&json!(12)));
    }

    #[test]
    fn rejects_transitions_out_of_terminal_states() {
        let mut state = ProcessingState::new("zip", Value::Null);
        assert!(state.successful().is_err(), "queued cannot complete without starting");

        state.started().unwrap().cancelled().unwrap();
        let err = state.started().unwrap_err();
        assert_eq!(err.from, Status::Cancelled);
        assert_eq!(err.to, Status::Started);
        assert!(state.failed(json!("late")).is_err());
        assert!(state.is_cancelled());
    }

    #[test]
    fn failure_detail_is_recorded_under_error() {
        let mut state = ProcessingState::new("panorama", Value::Null);
        state.started().unwrap().failed(json!({ "message": "decode failed" })).unwrap();
        assert_eq!(state.metadata()["error"]["message"], json!("decode failed"));
    }

    #[test]
    fn children_complete_independently_of_parent() {
        let mut root = ProcessingState::new("zip", Value::Null);
        root.started().unwrap();
        root.add_child("add_data").started().unwrap().successful().unwrap();
        root.add_child("add_tiles");

        assert!(root.is_started(), "children never complete the parent");
        assert!(root.child("add_data").unwrap().is_successful());
        assert!(root.child("add_tiles").unwrap().is_queued());
        assert_eq!(root.children().len(), 2);
    }

    #[test]
    fn subscribers_receive_own_changes_only() {
        let mut root = ProcessingState::new("zip", Value::Null);
        let root_rx = root.subscribe();
        let child = root.add_child("generate");
        let child_rx = child.subscribe();

        child.started().unwrap();
        root.started().unwrap();

        let child_changes: Vec<Status> = child_rx.try_iter().map(|c| c.status).collect();
        let root_changes: Vec<Status> = root_rx.try_iter().map(|c| c.status).collect();
        assert_eq!(child_changes, vec![Status::Started]);
        assert_eq!(root_changes, vec![Status::Started]);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut state = ProcessingState::new("panorama", Value::Null);
        drop(state.subscribe());
        state.started().unwrap();
        assert!(state.subscribers.is_empty());
    }

    #[test]
    fn snapshot_mirrors_tree() {
        let mut root = ProcessingState::new("zip", json!({ "panoramaNum": 2 }));
        root.started().unwrap();
        root.add_child("add_data").started().unwrap();

        let snapshot = root.snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["status"], json!("started"));
        assert_eq!(json["metadata"]["panoramaNum"], json!(2));
        assert_eq!(json["children"][0]["kind"], json!("add_data"));
    }
}
