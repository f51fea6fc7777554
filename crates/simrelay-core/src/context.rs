//! Shared relay state
//!
//! One [`RelayContext`] is shared by the controller, the worker and every
//! device logger. It owns the notify registry, the settings, the log sink and
//! the prefix, the per-device action tables and the ask guard. It also latches
//! the first fatal severity so an engine cannot carry on past it.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{FatalAction, RelayConfig};
use crate::event::{Event, EventBody, EventId};
use crate::prefix::{device_tag, LogPrefix, PrefixFields};
use crate::registry::NotifyRegistry;
use crate::settings::Settings;
use crate::severity::{Action, ActionTable, AskGuard, DeviceLogger, Fatal, SeverityLevel};
use crate::sink::{LogSink, LogTarget};

/// Behavior switches copied out of [`RelayConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub interactive: bool,
    pub debugger: bool,
    pub on_fatal: FatalAction,
    pub forward_reports: bool,
}

/// Machine state the prefix reads: tick counter and instruction pointer
#[derive(Debug, Default)]
pub struct MachineProbe {
    ticks: AtomicU64,
    instruction_pointer: AtomicU32,
}

impl MachineProbe {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn advance_ticks(&self, delta: u64) -> u64 {
        self.ticks.fetch_add(delta, Ordering::Relaxed) + delta
    }

    pub fn instruction_pointer(&self) -> u32 {
        self.instruction_pointer.load(Ordering::Relaxed)
    }

    pub fn set_instruction_pointer(&self, ip: u32) {
        self.instruction_pointer.store(ip, Ordering::Relaxed);
    }
}

pub struct RelayContext {
    options: RelayOptions,
    dispatch_batch: usize,
    registry: NotifyRegistry,
    settings: Settings,
    defaults: ActionTable,
    loggers: Mutex<Vec<(String, Arc<ActionTable>)>>,
    ask_guard: AskGuard,
    prefix: RwLock<LogPrefix>,
    sink: LogSink,
    probe: MachineProbe,
    interrupt: AtomicBool,
    pending_fatal: Mutex<Option<Fatal>>,
    next_event: AtomicU64,
}

impl RelayContext {
    /// Build a context, opening the configured log file
    pub fn new(config: RelayConfig) -> Arc<Self> {
        let sink = LogSink::open(LogTarget::from_spec(&config.log.file));
        Self::with_sink(config, sink)
    }

    /// Build a context around an already opened sink
    pub fn with_sink(config: RelayConfig, sink: LogSink) -> Arc<Self> {
        info!(
            sink = %sink.name(),
            prefix = %config.log.prefix,
            interactive = config.interactive,
            "Relay context created"
        );
        Arc::new(Self {
            options: RelayOptions {
                interactive: config.interactive,
                debugger: config.debugger,
                on_fatal: config.on_fatal,
                forward_reports: config.forward_reports,
            },
            dispatch_batch: config.controller.dispatch_batch.max(1),
            registry: NotifyRegistry::new(),
            settings: Settings::new(),
            defaults: config.action_table(),
            loggers: Mutex::new(Vec::new()),
            ask_guard: AskGuard::new(),
            prefix: RwLock::new(LogPrefix::parse(&config.log.prefix)),
            sink,
            probe: MachineProbe::default(),
            interrupt: AtomicBool::new(false),
            pending_fatal: Mutex::new(None),
            next_event: AtomicU64::new(1),
        })
    }

    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    pub fn dispatch_batch(&self) -> usize {
        self.dispatch_batch
    }

    pub fn registry(&self) -> &NotifyRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn sink(&self) -> &LogSink {
        &self.sink
    }

    pub fn probe(&self) -> &MachineProbe {
        &self.probe
    }

    pub fn ask_guard(&self) -> &AskGuard {
        &self.ask_guard
    }

    /// Logger for a device
    ///
    /// Asking twice for the same device returns loggers sharing one action
    /// table. A new device starts from the current default actions.
    pub fn logger(self: &Arc<Self>, name: &str) -> DeviceLogger {
        let tag = device_tag(name);
        let mut loggers = self.loggers.lock();
        let actions = match loggers.iter().find(|(t, _)| *t == tag) {
            Some((_, actions)) => Arc::clone(actions),
            None => {
                debug!(device = %tag, "Creating device logger");
                let actions = Arc::new(ActionTable::new(self.defaults.snapshot()));
                loggers.push((tag.clone(), Arc::clone(&actions)));
                actions
            }
        };
        DeviceLogger::new(tag, actions, Arc::clone(self))
    }

    /// Default action for loggers created from now on
    pub fn default_action(&self, level: SeverityLevel) -> Action {
        self.defaults.get(level)
    }

    /// Change a level's action for every logger, existing and future
    pub fn set_log_action(&self, level: SeverityLevel, action: Action) {
        self.defaults.set(level, action);
        let loggers = self.loggers.lock();
        for (_, actions) in loggers.iter() {
            actions.set(level, action);
        }
        info!(%level, %action, loggers = loggers.len(), "Log action changed");
    }

    /// Replace the prefix template
    pub fn set_prefix(&self, template: &str) {
        *self.prefix.write() = LogPrefix::parse(template);
    }

    pub fn prefix(&self) -> String {
        self.prefix.read().template().to_string()
    }

    /// Render a complete log line
    pub fn format_line(&self, level: SeverityLevel, device: &str, message: &str) -> String {
        let fields = PrefixFields {
            ticks: self.probe.ticks(),
            instruction_pointer: self.probe.instruction_pointer(),
            level,
            device,
        };
        let mut line = self.prefix.read().render(&fields);
        line.push(' ');
        if level == SeverityLevel::Panic {
            line.push_str(">>PANIC<< ");
        }
        line.push_str(message);
        line
    }

    /// Format and write a record to the sink
    pub fn record(&self, level: SeverityLevel, device: &str, message: &str) {
        self.sink.record(&self.format_line(level, device, message));
    }

    /// Allocate an event with a fresh id
    pub fn event(&self, body: EventBody) -> Event {
        Event::new(EventId(self.next_event.fetch_add(1, Ordering::Relaxed)), body)
    }

    /// Route an event through the registry
    pub fn notify(&self, event: Event) -> Option<Event> {
        self.registry.notify(event)
    }

    /// Ask the engine to break into its debugger at the next opportunity
    pub fn request_interrupt(&self) {
        info!("Debugger interrupt requested");
        self.interrupt.store(true, Ordering::Release);
    }

    pub fn interrupt_requested(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Consume a pending interrupt request
    pub fn take_interrupt(&self) -> bool {
        self.interrupt.swap(false, Ordering::AcqRel)
    }

    /// Remember a fatal until the worker ends; the first one wins
    pub(crate) fn latch_fatal(&self, fatal: Fatal) {
        let mut pending = self.pending_fatal.lock();
        match pending.as_ref() {
            Some(first) => warn!(first = %first, second = %fatal, "Fatal raised while another is pending"),
            None => *pending = Some(fatal),
        }
    }

    /// The fatal that is ending the current worker, if any
    pub fn pending_fatal(&self) -> Option<Fatal> {
        self.pending_fatal.lock().clone()
    }

    pub fn fatal_pending(&self) -> bool {
        self.pending_fatal.lock().is_some()
    }

    pub(crate) fn take_fatal(&self) -> Option<Fatal> {
        self.pending_fatal.lock().take()
    }
}

impl std::fmt::Debug for RelayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayContext")
            .field("options", &self.options)
            .field("sink", &self.sink)
            .field("prefix", &self.prefix())
            .finish_non_exhaustive()
    }
}
