//! In-memory collaborators for engine and controller tests.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{ReplyError, Result};
use crate::event::{EventKind, InboundEvent};
use crate::gateway::{BotIdentity, PlatformGateway};
use crate::generator::ResponseGenerator;

fn unavailable(operation: &'static str) -> ReplyError {
    ReplyError::GatewayRejected {
        operation,
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// Gateway returning the same event lists on every fetch
#[derive(Default)]
pub struct FakeGateway {
    pub mentions: Mutex<Vec<InboundEvent>>,
    pub dms: Mutex<Vec<InboundEvent>>,
    /// Number of upcoming mention fetches that fail
    pub failing_mention_fetches: AtomicU32,
    /// Number of upcoming DM fetches that fail
    pub failing_dm_fetches: AtomicU32,
    pub fail_identity: AtomicBool,
    /// Reply targets whose sends fail
    pub failing_targets: Mutex<HashSet<String>>,
    /// Every accepted send as (kind, target, text)
    pub sent: Mutex<Vec<(EventKind, String, String)>>,
    pub mention_fetches: AtomicU32,
    /// When each mention fetch happened, on the tokio clock
    pub mention_fetch_times: Mutex<Vec<Instant>>,
    /// Flipped to true when mentions are fetched, as if Ctrl+C hit mid-cycle
    pub shutdown_on_fetch: Mutex<Option<watch::Sender<bool>>>,
}

impl FakeGateway {
    pub fn with_events(mentions: Vec<InboundEvent>, dms: Vec<InboundEvent>) -> Self {
        Self {
            mentions: Mutex::new(mentions),
            dms: Mutex::new(dms),
            ..Self::default()
        }
    }

    pub fn fail_sends_to(&self, target: &str) {
        self.failing_targets.lock().unwrap().insert(target.to_string());
    }

    pub fn heal_sends_to(&self, target: &str) {
        self.failing_targets.lock().unwrap().remove(target);
    }

    pub fn sent(&self) -> Vec<(EventKind, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_targets(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, target, _)| target).collect()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn send(&self, kind: EventKind, target: &str, text: &str) -> Result<()> {
        if self.failing_targets.lock().unwrap().contains(target) {
            return Err(unavailable("send"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((kind, target.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl PlatformGateway for FakeGateway {
    async fn resolve_self_identity(&self) -> Result<BotIdentity> {
        if self.fail_identity.load(Ordering::SeqCst) {
            return Err(unavailable("resolve identity"));
        }
        Ok(BotIdentity {
            id: "42".to_string(),
            username: "codebot".to_string(),
        })
    }

    async fn fetch_mentions(&self) -> Result<Vec<InboundEvent>> {
        self.mention_fetches.fetch_add(1, Ordering::SeqCst);
        self.mention_fetch_times.lock().unwrap().push(Instant::now());
        if let Some(tx) = self.shutdown_on_fetch.lock().unwrap().as_ref() {
            let _ = tx.send(true);
        }
        if Self::take_failure(&self.failing_mention_fetches) {
            return Err(unavailable("fetch mentions"));
        }
        Ok(self.mentions.lock().unwrap().clone())
    }

    async fn fetch_direct_messages(&self) -> Result<Vec<InboundEvent>> {
        if Self::take_failure(&self.failing_dm_fetches) {
            return Err(unavailable("fetch direct messages"));
        }
        Ok(self.dms.lock().unwrap().clone())
    }

    async fn reply_to_mention(&self, event_id: &str, text: &str) -> Result<()> {
        self.send(EventKind::Mention, event_id, text)
    }

    async fn send_direct_message(&self, sender_id: &str, text: &str) -> Result<()> {
        self.send(EventKind::DirectMessage, sender_id, text)
    }
}

/// Generator echoing its input, with scripted failures
pub struct FakeGenerator {
    pub failing_inputs: Mutex<HashSet<String>>,
    pub empty_inputs: Mutex<HashSet<String>>,
    /// Returned instead of the echo when set
    pub fixed_reply: Option<String>,
    pub accepts_empty: bool,
    pub calls: Mutex<Vec<String>>,
}

impl Default for FakeGenerator {
    fn default() -> Self {
        Self {
            failing_inputs: Mutex::new(HashSet::new()),
            empty_inputs: Mutex::new(HashSet::new()),
            fixed_reply: None,
            accepts_empty: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeGenerator {
    pub fn failing_on(input: &str) -> Self {
        let generator = Self::default();
        generator
            .failing_inputs
            .lock()
            .unwrap()
            .insert(input.to_string());
        generator
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for FakeGenerator {
    async fn generate(&self, clean_text: &str) -> Result<String> {
        self.calls.lock().unwrap().push(clean_text.to_string());
        if self.failing_inputs.lock().unwrap().contains(clean_text) {
            return Err(ReplyError::Generation("model unavailable".to_string()));
        }
        if self.empty_inputs.lock().unwrap().contains(clean_text) {
            return Ok(String::new());
        }
        Ok(self
            .fixed_reply
            .clone()
            .unwrap_or_else(|| format!("re: {}", clean_text)))
    }

    fn accepts_empty_input(&self) -> bool {
        self.accepts_empty
    }
}
