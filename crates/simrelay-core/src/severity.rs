//! Severity levels, per-level actions and the ask/fatal escalation path
//!
//! Each [`DeviceLogger`] owns an [`ActionTable`] mapping every
//! [`SeverityLevel`] to an [`Action`]:
//!
//! - `Ignore`: nothing is recorded
//! - `Report`: the message is recorded in the log sink
//! - `Ask`: the message is recorded, then a blocking `SeverityAsk` event goes
//!   to the controller and the answer decides what happens next
//! - `Fatal`: the message is recorded and the sink is flushed. In
//!   `exit-process` mode the process ends on the spot. Otherwise the fatal is
//!   latched on the context and a [`Fatal`] error unwinds the engine back to
//!   the worker's top level. Every later log call and checkpoint fails until
//!   the worker is gone, so discarding the error does not keep it running.
//!
//! Asks are guarded against reentry: anything triggered while an ask is
//! outstanding that would ask again is dropped with a warning.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::RelayContext;
use crate::worker::fatal_exit;
use crate::event::{EventBody, ResultCode, SeverityRecord};

/// Ordered log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Debug,
    Info,
    Error,
    Panic,
}

impl SeverityLevel {
    /// All levels in ascending order
    pub const ALL: [SeverityLevel; 4] = [
        SeverityLevel::Debug,
        SeverityLevel::Info,
        SeverityLevel::Error,
        SeverityLevel::Panic,
    ];

    /// Single-character code used by the `%e` prefix token
    pub fn code(self) -> char {
        match self {
            SeverityLevel::Debug => 'd',
            SeverityLevel::Info => 'i',
            SeverityLevel::Error => 'e',
            SeverityLevel::Panic => 'p',
        }
    }

    /// Lowercase name
    pub fn name(self) -> &'static str {
        match self {
            SeverityLevel::Debug => "debug",
            SeverityLevel::Info => "info",
            SeverityLevel::Error => "error",
            SeverityLevel::Panic => "panic",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SeverityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(SeverityLevel::Debug),
            "info" => Ok(SeverityLevel::Info),
            "error" => Ok(SeverityLevel::Error),
            "panic" => Ok(SeverityLevel::Panic),
            other => Err(format!("unknown severity level '{other}'")),
        }
    }
}

/// What to do with a message at a given level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Ignore,
    Report,
    Ask,
    Fatal,
}

impl Action {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Action::Ignore,
            1 => Action::Report,
            2 => Action::Ask,
            _ => Action::Fatal,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Ignore => "ignore",
            Action::Report => "report",
            Action::Ask => "ask",
            Action::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Action::Ignore),
            "report" => Ok(Action::Report),
            "ask" => Ok(Action::Ask),
            "fatal" => Ok(Action::Fatal),
            other => Err(format!("unknown log action '{other}'")),
        }
    }
}

/// Per-level actions, readable and writable from any thread
#[derive(Debug)]
pub struct ActionTable {
    actions: [AtomicU8; 4],
}

impl ActionTable {
    /// Table with explicit actions, indexed by level
    pub fn new(actions: [Action; 4]) -> Self {
        Self {
            actions: actions.map(|a| AtomicU8::new(a as u8)),
        }
    }

    /// Built-in defaults; panics ask only when someone is there to answer
    pub fn defaults(interactive: bool) -> Self {
        Self::new(Self::default_actions(interactive))
    }

    /// The default action array
    pub fn default_actions(interactive: bool) -> [Action; 4] {
        [
            Action::Ignore,
            Action::Report,
            Action::Report,
            if interactive { Action::Ask } else { Action::Fatal },
        ]
    }

    /// Current action for a level
    pub fn get(&self, level: SeverityLevel) -> Action {
        Action::from_u8(self.actions[level.index()].load(Ordering::Acquire))
    }

    /// Change the action for a level
    pub fn set(&self, level: SeverityLevel, action: Action) {
        self.actions[level.index()].store(action as u8, Ordering::Release);
    }

    /// Copy of all actions, indexed by level
    pub fn snapshot(&self) -> [Action; 4] {
        SeverityLevel::ALL.map(|level| self.get(level))
    }
}

/// Process-wide flag preventing an ask from triggering another ask
#[derive(Debug, Default)]
pub struct AskGuard {
    active: AtomicBool,
    rejected: AtomicU64,
}

impl AskGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard; `None` if an ask is already in progress
    pub fn try_enter(&self) -> Option<AskToken<'_>> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| AskToken { guard: self })
            .or_else(|| {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            })
    }

    /// Whether an ask is outstanding
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// How many asks were dropped for reentry
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Held while an ask is outstanding; releases the guard on drop
#[derive(Debug)]
pub struct AskToken<'a> {
    guard: &'a AskGuard,
}

impl Drop for AskToken<'_> {
    fn drop(&mut self) {
        self.guard.active.store(false, Ordering::Release);
    }
}

/// Answer to a severity ask
///
/// The discriminants are the wire codes exchanged with the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AskChoice {
    /// Keep going
    Continue = 0,
    /// Keep going and report (not ask) at this level from now on
    ContinueAlways = 1,
    /// End the simulation through the fatal path
    Terminate = 2,
    /// Abort with a core dump
    DumpCore = 3,
    /// Request an interrupt into the debugger, then keep going
    Debug = 4,
}

impl AskChoice {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(AskChoice::Continue),
            1 => Some(AskChoice::ContinueAlways),
            2 => Some(AskChoice::Terminate),
            3 => Some(AskChoice::DumpCore),
            4 => Some(AskChoice::Debug),
            _ => None,
        }
    }

    pub fn result(self) -> ResultCode {
        ResultCode::new(self.code())
    }
}

/// Why the fatal path was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    /// The level's action is `Fatal`
    Policy,
    /// The user chose to terminate from an ask
    UserTerminate,
    /// The user chose to dump core from an ask
    DumpCore,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::Policy => f.write_str("fatal log action"),
            FatalReason::UserTerminate => f.write_str("terminated by user"),
            FatalReason::DumpCore => f.write_str("core dump requested"),
        }
    }
}

/// A fatal severity unwinding toward the worker's top level
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{device} {message} ({reason})")]
pub struct Fatal {
    pub reason: FatalReason,
    pub device: String,
    pub message: String,
}

impl Fatal {
    pub fn new(reason: FatalReason, device: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason,
            device: device.into(),
            message: message.into(),
        }
    }
}

/// Severity logger for one simulated device
///
/// Cloning shares the action table, so a downgrade through one clone is seen
/// by all of them.
#[derive(Debug, Clone)]
pub struct DeviceLogger {
    tag: String,
    actions: Arc<ActionTable>,
    ctx: Arc<RelayContext>,
}

impl DeviceLogger {
    pub(crate) fn new(tag: String, actions: Arc<ActionTable>, ctx: Arc<RelayContext>) -> Self {
        Self { tag, actions, ctx }
    }

    /// Rendered device tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// This device's action table
    pub fn actions(&self) -> &ActionTable {
        &self.actions
    }

    pub fn debug(&self, message: impl fmt::Display) -> Result<(), Fatal> {
        self.log(SeverityLevel::Debug, message)
    }

    pub fn info(&self, message: impl fmt::Display) -> Result<(), Fatal> {
        self.log(SeverityLevel::Info, message)
    }

    pub fn error(&self, message: impl fmt::Display) -> Result<(), Fatal> {
        self.log(SeverityLevel::Error, message)
    }

    pub fn panic(&self, message: impl fmt::Display) -> Result<(), Fatal> {
        self.log(SeverityLevel::Panic, message)
    }

    /// Apply the level's action to a message
    ///
    /// Once a fatal has been raised on this context, every call fails with it
    /// until the worker ends. When the fatal ends the process, this never
    /// returns.
    pub fn log(&self, level: SeverityLevel, message: impl fmt::Display) -> Result<(), Fatal> {
        if let Some(fatal) = self.ctx.pending_fatal() {
            return Err(fatal);
        }

        let action = self.actions.get(level);
        if action == Action::Ignore {
            return Ok(());
        }

        let message = message.to_string();
        self.ctx.record(level, &self.tag, &message);

        match action {
            Action::Ignore => Ok(()),
            Action::Report => {
                if self.ctx.options().forward_reports {
                    let record = SeverityRecord::new(level, &self.tag, &message);
                    self.ctx.notify(self.ctx.event(EventBody::SeverityNotify(record)));
                }
                Ok(())
            }
            Action::Ask => self.ask(level, message),
            Action::Fatal => Err(self.fail(FatalReason::Policy, message)),
        }
    }

    fn ask(&self, level: SeverityLevel, message: String) -> Result<(), Fatal> {
        let Some(_token) = self.ctx.ask_guard().try_enter() else {
            warn!(device = %self.tag, %level, "Severity ask should not reenter, dropping");
            return Ok(());
        };

        let record = SeverityRecord::new(level, &self.tag, &message);
        let result = self
            .ctx
            .notify(self.ctx.event(EventBody::SeverityAsk(record)))
            .map(|response| response.result)
            .unwrap_or(ResultCode::REJECTED);
        debug!(device = %self.tag, %level, %result, "Severity ask answered");

        match AskChoice::from_code(result.code()) {
            Some(AskChoice::Continue) => Ok(()),
            Some(AskChoice::ContinueAlways) => {
                info!(device = %self.tag, %level, "No longer asking at this level");
                self.actions.set(level, Action::Report);
                Ok(())
            }
            Some(AskChoice::Terminate) => Err(self.fail(FatalReason::UserTerminate, message)),
            Some(AskChoice::DumpCore) => Err(self.fail(FatalReason::DumpCore, message)),
            Some(AskChoice::Debug) if self.ctx.options().debugger => {
                self.ctx.request_interrupt();
                Ok(())
            }
            _ => {
                warn!(device = %self.tag, %result, "Severity ask returned unexpected value");
                Ok(())
            }
        }
    }

    /// Flush, then either end the process or latch the fatal for the worker
    fn fail(&self, reason: FatalReason, message: String) -> Fatal {
        self.ctx.sink().flush();
        let fatal = Fatal::new(reason, &self.tag, message);
        if self.ctx.options().on_fatal.ends_process(reason) {
            fatal_exit(&fatal);
        }
        self.ctx.latch_fatal(fatal.clone());
        fatal
    }
}
