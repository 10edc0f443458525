//! Hierarchical event bus for script handlers.
//!
//! Channels are `:`-delimited names such as `change:graphic:left`. Firing a
//! channel cascades from the most specific name down to its first segment,
//! so a handler on `change:graphic` sees every graphic property change.
//! `sheetWorkerCompleted` is the exception: its handlers fire once and are
//! then discarded.

use crate::entity::Entity;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Separator between channel segments.
pub const CHANNEL_DELIMITER: char = ':';

/// One-shot channel fired after worker-mediated attribute writes.
pub const SHEET_WORKER_COMPLETED: &str = "sheetWorkerCompleted";

/// A parsed channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    segments: Vec<String>,
}

impl Channel {
    pub fn parse(name: &str) -> Self {
        Self {
            segments: name.split(CHANNEL_DELIMITER).map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Full channel name
    pub fn name(&self) -> String {
        self.segments.join(&CHANNEL_DELIMITER.to_string())
    }

    /// Registry keys to fire, most specific first.
    pub fn prefixes(&self) -> Vec<String> {
        (1..=self.segments.len())
            .rev()
            .map(|len| self.segments[..len].join(&CHANNEL_DELIMITER.to_string()))
            .collect()
    }

    pub fn is_one_shot(&self) -> bool {
        self.segments.len() == 1 && self.segments[0] == SHEET_WORKER_COMPLETED
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A single argument delivered to event handlers.
#[derive(Debug, Clone)]
pub enum Payload {
    Value(Value),
    Entity(Entity),
}

impl Payload {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(value) => Some(value),
            Payload::Entity(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Payload::Entity(entity) => Some(entity),
            Payload::Value(_) => None,
        }
    }
}

/// Script-registered event handler.
pub type Handler = Rc<dyn Fn(&[Payload])>;

/// Wrap a closure as a [`Handler`].
pub fn handler(f: impl Fn(&[Payload]) + 'static) -> Handler {
    Rc::new(f)
}

/// Publish/subscribe registry shared by every component of one sandbox.
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Rc<RefCell<HashMap<String, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to a channel. The same handler may be added more
    /// than once and then fires once per registration.
    pub fn subscribe(&self, channel: &str, handler: Handler) {
        trace!(channel, "Subscribing handler");
        self.handlers
            .borrow_mut()
            .entry(channel.to_string())
            .or_default()
            .push(handler);
    }

    /// Register a handler for the next `sheetWorkerCompleted` fire.
    pub fn subscribe_once(&self, handler: Handler) {
        self.subscribe(SHEET_WORKER_COMPLETED, handler);
    }

    /// Fire a channel and return how many handlers were invoked.
    ///
    /// Handlers are collected before any of them runs, so handlers that
    /// subscribe or publish during the fire never affect the fire itself.
    pub fn publish(&self, channel: &str, payload: &[Payload]) -> usize {
        let channel = Channel::parse(channel);

        let batch: Vec<Handler> = if channel.is_one_shot() {
            self.handlers
                .borrow_mut()
                .remove(SHEET_WORKER_COMPLETED)
                .unwrap_or_default()
        } else {
            let registry = self.handlers.borrow();
            let snapshot: Vec<Handler> = channel
                .prefixes()
                .iter()
                .filter(|key| key.as_str() != SHEET_WORKER_COMPLETED)
                .filter_map(|key| registry.get(key))
                .flat_map(|handlers| handlers.iter().cloned())
                .collect();
            snapshot
        };

        debug!(channel = %channel, handlers = batch.len(), "Publishing event");

        for handler in &batch {
            handler(payload);
        }
        batch.len()
    }

    /// Number of handlers registered under exactly this name.
    pub fn handler_count(&self, channel: &str) -> usize {
        self.handlers
            .borrow()
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.handlers.borrow();
        let mut channels: Vec<_> = registry.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        channels.sort();
        f.debug_struct("EventBus").field("channels", &channels).finish()
    }
}
