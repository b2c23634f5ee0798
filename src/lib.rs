//! Reply Loop: a polling service that answers social-platform mentions and
//! direct messages with generated replies.
//!
//! This crate provides the dedup cursor, the per-cycle dispatch engine and the
//! loop controller, generic over the platform gateway and response generator.

pub mod action;
pub mod config;
pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod formatter;
pub mod gateway;
pub mod generator;
pub mod loop_controller;
pub mod sanitize;
pub mod state;
pub mod twitter;

#[cfg(test)]
pub(crate) mod fakes;

pub use action::Action;
pub use config::Config;
pub use cursor::Cursor;
pub use dispatch::{CycleReport, DispatchEngine, EventOutcome, OutcomeCounts};
pub use error::{ReplyError, Result};
pub use event::{EventKind, InboundEvent, OutboundReply};
pub use gateway::{BotIdentity, PlatformGateway};
pub use generator::{OpenAiGenerator, ResponseGenerator};
pub use loop_controller::{LoopController, LoopResult};
pub use twitter::XGateway;
