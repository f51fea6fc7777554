//! # Simulator Event Relay
//!
//! Lets a simulation engine running on its own thread talk to a foreground
//! controller without sharing mutable state, and turns log severities into
//! ignored, recorded, asked or fatal outcomes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────┐  non-blocking queue  ┌─────────────────┐
//! │  Worker thread  │─────────────────────▶│   Controller    │
//! │  (Engine loop)  │                      │  (Frontend UI)  │
//! └─────────────────┘◀─────────────────────└─────────────────┘
//!         │               EventMailbox              │
//!         ▼                                         ▼
//! ┌─────────────────┐                      ┌─────────────────┐
//! │  DeviceLogger   │                      │    Settings     │
//! │ (ActionTable)   │                      │  (value reqs)   │
//! └─────────────────┘                      └─────────────────┘
//! ```
//!
//! - [`worker`]: the engine thread and its notification entry point
//! - [`controller`]: dispatches events to a [`Frontend`] and answers them
//! - [`mailbox`]: single-slot response exchange
//! - [`severity`]: per-level actions and the ask/fatal escalation
//! - [`context`]: shared state passed to every component
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use simrelay_core::{
//!     AskChoice, Controller, EngineHost, Frontend, RelayConfig, RelayContext, RelayResult,
//!     SeverityAsk, ValuePrompt,
//! };
//!
//! struct AlwaysContinue;
//!
//! impl Frontend for AlwaysContinue {
//!     fn request_value(&mut self, _prompt: &ValuePrompt) -> Option<String> {
//!         None
//!     }
//!     fn ask_severity(&mut self, _ask: &SeverityAsk) -> AskChoice {
//!         AskChoice::Continue
//!     }
//! }
//!
//! let ctx = RelayContext::new(RelayConfig::default());
//! let mut controller = Controller::new(ctx, AlwaysContinue);
//! controller
//!     .start(|host: &EngineHost| -> RelayResult<()> {
//!         let cpu = host.logger("CPU");
//!         while !host.checkpoint().is_cancel() {
//!             host.advance_ticks(1);
//!             cpu.debug("tick")?;
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! controller.request_stop();
//! while controller.is_running() {
//!     controller.wait_and_dispatch(Duration::from_millis(50));
//! }
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod event;
pub mod mailbox;
pub mod prefix;
pub mod registry;
pub mod settings;
pub mod severity;
pub mod sink;
pub mod worker;

pub use config::{ConfigError, FatalAction, RelayConfig};
pub use context::{MachineProbe, RelayContext, RelayOptions};
pub use controller::{Controller, Frontend, SeverityAsk, StatusChange, ValuePrompt};
pub use error::{RelayError, RelayResult};
pub use event::{Event, EventBody, EventId, EventKind, ResultCode, SeverityRecord, ValueKind, ValueRequest};
pub use mailbox::EventMailbox;
pub use prefix::{device_tag, LogPrefix, DEFAULT_PREFIX};
pub use registry::{NotifyRegistry, NotifyTarget};
pub use settings::{SettingFlags, Settings, StringSetting};
pub use severity::{Action, ActionTable, AskChoice, AskGuard, DeviceLogger, Fatal, FatalReason, SeverityLevel};
pub use sink::{LogSink, LogTarget, SharedBuffer};
pub use worker::{Checkpoint, Engine, EngineHost, ValueOutcome, WorkerExit, WorkerHandle, WorkerState};
