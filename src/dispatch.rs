//! One polling cycle: fetch, filter new events, generate, format, send, commit.
//!
//! Events are handled one at a time in the order the gateway returned them.
//! A failure on one event is recorded as an [`EventOutcome`] and never stops
//! its siblings; only a failed fetch ends the cycle early.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cursor::Cursor;
use crate::error::{ReplyError, Result};
use crate::event::{EventKind, InboundEvent, OutboundReply};
use crate::formatter::format_reply;
use crate::gateway::PlatformGateway;
use crate::generator::ResponseGenerator;
use crate::sanitize::sanitize_with_marker;

/// Why an event was passed over without a reply attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The cursor already covers this event
    AlreadyHandled,
    /// Nothing was left after sanitizing and the generator needs input
    EmptyInput,
}

/// Why a reply attempt did not go out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Generation(String),
    EmptyGeneration,
    Send(String),
}

/// Result of handling a single event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Reply accepted by the platform and committed
    Sent,
    Skipped(SkipReason),
    /// Not committed, eligible again next cycle
    Failed(FailureReason),
}

/// Outcome of one event, as recorded in a [`CycleReport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_id: String,
    pub kind: EventKind,
    pub outcome: EventOutcome,
}

/// Sent, skipped and failed tallies for one event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeCounts {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn add(&mut self, outcome: &EventOutcome) {
        match outcome {
            EventOutcome::Sent => self.sent += 1,
            EventOutcome::Skipped(_) => self.skipped += 1,
            EventOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: OutcomeCounts) {
        self.sent += other.sent;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Per-event outcomes of one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub records: Vec<EventRecord>,
    /// The cycle stopped early because shutdown was requested
    pub interrupted: bool,
}

impl CycleReport {
    pub fn sent(&self) -> usize {
        self.count(|outcome| matches!(outcome, EventOutcome::Sent))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, EventOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, EventOutcome::Failed(_)))
    }

    /// Tallies restricted to one event kind
    pub fn counts(&self, kind: EventKind) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for record in self.records.iter().filter(|record| record.kind == kind) {
            counts.add(&record.outcome);
        }
        counts
    }

    /// Outcome recorded for an event id, if it was attempted
    pub fn outcome_of(&self, event_id: &str) -> Option<&EventOutcome> {
        self.records
            .iter()
            .find(|record| record.event_id == event_id)
            .map(|record| &record.outcome)
    }

    fn count(&self, predicate: impl Fn(&EventOutcome) -> bool) -> usize {
        self.records
            .iter()
            .filter(|record| predicate(&record.outcome))
            .count()
    }
}

/// Drives a single fetch-to-commit pass over mentions and direct messages
pub struct DispatchEngine<G: PlatformGateway, R: ResponseGenerator> {
    gateway: G,
    generator: R,
    message_limit: usize,
    address_marker: char,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<G: PlatformGateway, R: ResponseGenerator> DispatchEngine<G, R> {
    pub fn new(gateway: G, generator: R, message_limit: usize, address_marker: char) -> Self {
        Self {
            gateway,
            generator,
            message_limit,
            address_marker,
            shutdown: None,
        }
    }

    /// Stop between events once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Run one cycle, recording outcomes into `report`.
    ///
    /// Mentions are fully processed before direct messages are fetched, so a
    /// failed DM fetch still leaves the mention outcomes in `report`.
    pub async fn run_cycle(&self, cursor: &mut Cursor, report: &mut CycleReport) -> Result<()> {
        let mentions = self.gateway.fetch_mentions().await?;
        debug!("Fetched {} mentions", mentions.len());
        if !self.process_batch(&mentions, cursor, report).await {
            report.interrupted = true;
            return Ok(());
        }

        let messages = self.gateway.fetch_direct_messages().await?;
        debug!("Fetched {} direct messages", messages.len());
        if !self.process_batch(&messages, cursor, report).await {
            report.interrupted = true;
        }
        Ok(())
    }

    /// Returns false if shutdown cut the batch short
    async fn process_batch(
        &self,
        events: &[InboundEvent],
        cursor: &mut Cursor,
        report: &mut CycleReport,
    ) -> bool {
        for event in events {
            if self.shutdown_requested() {
                info!("Shutdown requested, leaving remaining events for later");
                return false;
            }

            let outcome = self.process_event(event, cursor).await;
            match &outcome {
                EventOutcome::Sent => {
                    info!("Replied to {} {}", event.kind, event.id);
                }
                EventOutcome::Skipped(SkipReason::AlreadyHandled) => {}
                EventOutcome::Skipped(SkipReason::EmptyInput) => {
                    debug!("Skipping {} {}: no text after sanitizing", event.kind, event.id);
                }
                EventOutcome::Failed(reason) => {
                    warn!("Failed to answer {} {}: {:?}", event.kind, event.id, reason);
                }
            }
            report.records.push(EventRecord {
                event_id: event.id.clone(),
                kind: event.kind,
                outcome,
            });
        }
        true
    }

    /// Handle one event. The cursor is committed only after a successful send.
    pub async fn process_event(&self, event: &InboundEvent, cursor: &mut Cursor) -> EventOutcome {
        if !cursor.is_new(event) {
            return EventOutcome::Skipped(SkipReason::AlreadyHandled);
        }

        let clean_text = sanitize_with_marker(&event.raw_text, self.address_marker);
        if clean_text.is_empty() && !self.generator.accepts_empty_input() {
            return EventOutcome::Skipped(SkipReason::EmptyInput);
        }

        let generated = match self.generator.generate(&clean_text).await {
            Ok(text) if text.trim().is_empty() => {
                return EventOutcome::Failed(FailureReason::EmptyGeneration)
            }
            Ok(text) => text,
            Err(ReplyError::EmptyGeneration) => {
                return EventOutcome::Failed(FailureReason::EmptyGeneration)
            }
            Err(e) => return EventOutcome::Failed(FailureReason::Generation(e.to_string())),
        };

        let reply = OutboundReply::for_event(event, format_reply(&generated, self.message_limit));
        let sent = match event.kind {
            EventKind::Mention => {
                self.gateway
                    .reply_to_mention(&reply.target_id, &reply.text)
                    .await
            }
            EventKind::DirectMessage => {
                self.gateway
                    .send_direct_message(&reply.target_id, &reply.text)
                    .await
            }
        };

        match sent {
            Ok(()) => {
                cursor.commit(event);
                EventOutcome::Sent
            }
            Err(e) => EventOutcome::Failed(FailureReason::Send(e.to_string())),
        }
    }
}
