//! Entity change notifications.
//!
//! Publishing is fire-and-forget: no engine logic depends on what subscribers
//! do with an event.

use parking_lot::Mutex;

use crate::model::{Language, LocalizedProperty, ResourceEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// The entity an event is about, as it looked after the change
/// (before it, for deletions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitySnapshot {
    Language(Language),
    Resource(ResourceEntry),
    Property(LocalizedProperty),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityEvent {
    pub change: ChangeKind,
    pub entity: EntitySnapshot,
}

impl EntityEvent {
    pub fn new(change: ChangeKind, entity: EntitySnapshot) -> Self {
        EntityEvent { change, entity }
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: EntityEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventPublisher;

impl EventPublisher for NullEventPublisher {
    fn publish(&self, _event: EntityEvent) {}
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<EntityEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EntityEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns the recorded events.
    pub fn take(&self) -> Vec<EntityEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: EntityEvent) {
        self.events.lock().push(event);
    }
}
