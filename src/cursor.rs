//! Tracks which inbound events have already been answered.
//!
//! Mentions are tracked with a time high-water mark, direct messages by id.
//! The state lives for the process lifetime only.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::event::{EventKind, InboundEvent};

/// Dedup state for one bot account
#[derive(Debug, Clone)]
pub struct Cursor {
    last_mention_time: DateTime<Utc>,
    processed_dm_ids: HashSet<String>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    /// Start with the high-water mark at the current time
    pub fn new() -> Self {
        Self::with_epoch(Utc::now())
    }

    /// Start with the high-water mark at a given time
    pub fn with_epoch(epoch: DateTime<Utc>) -> Self {
        Self {
            last_mention_time: epoch,
            processed_dm_ids: HashSet::new(),
        }
    }

    /// Whether the event has not been answered yet. No side effects.
    pub fn is_new(&self, event: &InboundEvent) -> bool {
        match event.kind {
            EventKind::Mention => event.created_at > self.last_mention_time,
            EventKind::DirectMessage => !self.processed_dm_ids.contains(&event.id),
        }
    }

    /// Record the event as answered.
    ///
    /// Only call this after the reply was accepted by the platform.
    pub fn commit(&mut self, event: &InboundEvent) {
        match event.kind {
            EventKind::Mention => {
                if event.created_at > self.last_mention_time {
                    self.last_mention_time = event.created_at;
                }
            }
            EventKind::DirectMessage => {
                self.processed_dm_ids.insert(event.id.clone());
            }
        }
    }

    pub fn last_mention_time(&self) -> DateTime<Utc> {
        self.last_mention_time
    }

    /// Number of direct message ids remembered (never shrinks)
    pub fn processed_dm_count(&self) -> usize {
        self.processed_dm_ids.len()
    }
}
