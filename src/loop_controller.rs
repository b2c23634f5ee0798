use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::cursor::Cursor;
use crate::dispatch::{CycleReport, DispatchEngine};
use crate::error::{ReplyError, Result};
use crate::gateway::PlatformGateway;
use crate::generator::ResponseGenerator;
use crate::state::{LoopState, SharedState};

/// Result of the loop execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopResult {
    /// Shutdown was requested
    Shutdown {
        /// Number of cycles started before shutdown
        cycles: u32,
    },
    /// The configured number of cycles ran
    CyclesExhausted {
        /// Number of cycles completed
        cycles: u32,
    },
}

/// Main loop controller that runs dispatch cycles on a fixed interval
pub struct LoopController<G: PlatformGateway, R: ResponseGenerator> {
    config: Arc<Config>,
    engine: DispatchEngine<G, R>,
    cursor: Cursor,
    state: Arc<SharedState>,
    shutdown: watch::Receiver<bool>,
}

impl<G: PlatformGateway, R: ResponseGenerator> LoopController<G, R> {
    /// Create a new LoopController. Sending `true` on the shutdown channel
    /// stops the loop between events or during sleep.
    pub fn new(config: Config, gateway: G, generator: R, shutdown: watch::Receiver<bool>) -> Self {
        Self::with_state(config, gateway, generator, shutdown, SharedState::new_shared())
    }

    /// Create a new LoopController with an existing shared state
    pub fn with_state(
        config: Config,
        gateway: G,
        generator: R,
        shutdown: watch::Receiver<bool>,
        state: Arc<SharedState>,
    ) -> Self {
        let cursor = match config.mention_epoch {
            Some(epoch) => Cursor::with_epoch(epoch),
            None => Cursor::new(),
        };
        let engine = DispatchEngine::new(
            gateway,
            generator,
            config.message_limit,
            config.address_marker,
        )
        .with_shutdown(shutdown.clone());

        Self {
            config: Arc::new(config),
            engine,
            cursor,
            state,
            shutdown,
        }
    }

    /// Get a reference to the shared state
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn cycle_limit_reached(&self, cycles: u32) -> bool {
        self.config.max_cycles.is_some_and(|max| cycles >= max)
    }

    /// Resolve the bot identity, then run cycles until shutdown or the
    /// cycle limit. Only a startup failure ends the loop with an error.
    pub async fn run(&mut self) -> Result<LoopResult> {
        self.state.set_loop_state(LoopState::Idle).await;

        let identity = self
            .engine
            .gateway()
            .resolve_self_identity()
            .await
            .map_err(|e| ReplyError::Startup(format!("could not resolve bot identity: {}", e)))?;
        info!("Running as @{} ({})", identity.username, identity.id);

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut cycles = 0;

        loop {
            if self.shutdown_requested() {
                return Ok(LoopResult::Shutdown { cycles });
            }
            if self.cycle_limit_reached(cycles) {
                self.state.set_loop_state(LoopState::Idle).await;
                return Ok(LoopResult::CyclesExhausted { cycles });
            }

            cycles = self.state.increment_cycle().await;
            self.state.set_loop_state(LoopState::Running).await;
            debug!("Starting cycle {}", cycles);

            let mut report = CycleReport::default();
            match self.engine.run_cycle(&mut self.cursor, &mut report).await {
                Ok(()) => {
                    info!(
                        "Cycle {} complete: {} sent, {} skipped, {} failed",
                        cycles,
                        report.sent(),
                        report.skipped(),
                        report.failed()
                    );
                }
                Err(e) => {
                    error!("Cycle {} failed: {}", cycles, e);
                    self.state.record_cycle_failure().await;
                }
            }
            self.state.record_report(&report).await;

            // Shutdown wins over the cycle limit so Ctrl+C is reported as such
            if report.interrupted || self.shutdown_requested() {
                return Ok(LoopResult::Shutdown { cycles });
            }
            if self.cycle_limit_reached(cycles) {
                self.state.set_loop_state(LoopState::Idle).await;
                return Ok(LoopResult::CyclesExhausted { cycles });
            }

            self.state.set_loop_state(LoopState::Sleeping).await;
            debug!("Sleeping {}s until next cycle", interval.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    info!("Shutdown requested while sleeping");
                    return Ok(LoopResult::Shutdown { cycles });
                }
            }
        }
    }
}

/// Resolves once the shutdown flag is true. Never resolves if the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
