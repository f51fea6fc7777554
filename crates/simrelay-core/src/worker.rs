//! Worker thread running the engine
//!
//! The engine runs on a dedicated `simrelay-worker` thread. Everything it sends
//! to the controller goes through [`WorkerLink`], the worker's notification
//! entry point:
//!
//! 1. A synchronous event clears the mailbox and starts out as rejected.
//! 2. A cancel check is answered right here from the cancel flag. It also
//!    parks the worker while a pause is in effect.
//! 3. Anything else is queued for the controller without blocking. An
//!    asynchronous event returns at once; a synchronous one waits on the
//!    mailbox for the controller's answer.
//!
//! Cancellation is cooperative. [`WorkerHandle::request_stop`] only sets a
//! flag, and the engine notices it at its next [`EngineHost::checkpoint`].
//! A fatal latched on the context cancels the same way, and it becomes the
//! worker's exit whatever the engine returns.

use std::any::Any;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use flume::Sender;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::context::RelayContext;
use crate::error::{RelayError, RelayResult};
use crate::event::{Event, EventBody, ResultCode, ValueRequest};
use crate::mailbox::EventMailbox;
use crate::registry::NotifyTarget;
use crate::severity::{DeviceLogger, Fatal, FatalReason};

/// The simulation loop a worker runs
pub trait Engine: Send + 'static {
    fn run(self: Box<Self>, host: &EngineHost) -> RelayResult<()>;
}

impl<F> Engine for F
where
    F: FnOnce(&EngineHost) -> RelayResult<()> + Send + 'static,
{
    fn run(self: Box<Self>, host: &EngineHost) -> RelayResult<()> {
        (*self)(host)
    }
}

/// Lifecycle of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Paused,
    CancelRequested,
    Terminated,
}

/// How the engine loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Returned normally without a stop request
    Completed,
    /// Returned after a stop request
    Cancelled,
    /// Unwound with a fatal severity
    Fatal(Fatal),
    /// Returned any other error
    Failed(String),
    /// The engine panicked
    Panicked(String),
}

impl WorkerExit {
    /// Fatal, failed or panicked
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            WorkerExit::Fatal(_) | WorkerExit::Failed(_) | WorkerExit::Panicked(_)
        )
    }
}

/// Result of a cancellation checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Cancel,
}

impl Checkpoint {
    pub fn is_cancel(self) -> bool {
        self == Checkpoint::Cancel
    }
}

/// Result of asking the controller for a setting value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueOutcome {
    /// The new value, already applied to the setting
    Accepted(String),
    /// The user dismissed the prompt
    Cancelled,
    /// The controller could not serve the request
    Rejected,
}

/// Messages queued from the worker to the controller
#[derive(Debug)]
pub enum ControllerMessage {
    Event(Envelope),
    WorkerExited(WorkerExit),
}

/// An event in transit, with the mailbox to answer into when it is synchronous
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    pub(crate) reply: Option<Arc<EventMailbox>>,
}

impl Envelope {
    /// Whether the sender is waiting for an answer
    pub fn expects_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Deliver the answer, if anyone is waiting
    pub(crate) fn respond(self) {
        let Envelope { event, reply } = self;
        if let Some(mailbox) = reply {
            mailbox.send(event);
        }
    }
}

/// The worker's sending end of the controller queue
///
/// Closing it is final. Each send holds the gate lock, so once [`close`]
/// returns every message that made it in is already queued.
///
/// [`close`]: ControllerLine::close
#[derive(Debug, Clone)]
pub(crate) struct ControllerLine {
    tx: Sender<ControllerMessage>,
    open: Arc<Mutex<bool>>,
}

impl ControllerLine {
    pub(crate) fn new(tx: Sender<ControllerMessage>) -> Self {
        Self {
            tx,
            open: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a message; hands it back if the controller is closed or gone
    pub(crate) fn send(&self, message: ControllerMessage) -> Result<(), ControllerMessage> {
        let open = self.open.lock();
        if !*open {
            return Err(message);
        }
        self.tx.send(message).map_err(|flume::SendError(message)| message)
    }

    /// Refuse every later send
    pub(crate) fn close(&self) {
        *self.open.lock() = false;
    }
}

/// Control state shared by the worker thread and its handle
#[derive(Debug)]
struct WorkerControl {
    cancel: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    state: Mutex<WorkerState>,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            cancel: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            state: Mutex::new(WorkerState::Created),
        }
    }

    fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock();
        if *state != WorkerState::Terminated {
            *state = next;
        }
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn request_stop(&self) -> bool {
        if self.state() == WorkerState::Terminated || self.cancel.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state(WorkerState::CancelRequested);
        // A stop lifts any pause and wakes the worker so it can observe it
        let mut paused = self.paused.lock();
        *paused = false;
        self.resumed.notify_all();
        true
    }

    fn set_paused(&self, pause: bool) -> bool {
        let mut paused = self.paused.lock();
        if *paused == pause || self.cancel_requested() {
            return false;
        }
        *paused = pause;
        match self.state() {
            WorkerState::Created | WorkerState::Running if pause => self.set_state(WorkerState::Paused),
            WorkerState::Paused if !pause => self.set_state(WorkerState::Running),
            _ => {}
        }
        if !pause {
            self.resumed.notify_all();
        }
        true
    }

    fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    fn wait_while_paused(&self) {
        let mut paused = self.paused.lock();
        while *paused && !self.cancel_requested() {
            debug!("Worker paused");
            self.resumed.wait(&mut paused);
        }
    }
}

/// The worker's notification entry point
pub struct WorkerLink {
    mailbox: Arc<EventMailbox>,
    line: ControllerLine,
    control: Arc<WorkerControl>,
    thread: ThreadId,
}

impl NotifyTarget for WorkerLink {
    fn notify(&self, mut event: Event) -> Option<Event> {
        let synchronous = event.is_synchronous();
        if synchronous {
            // Only the worker may wait on its own mailbox
            if thread::current().id() != self.thread {
                warn!(event_id = %event.id(), kind = %event.kind(), "Synchronous event raised off the worker thread, rejecting");
                event.result = ResultCode::REJECTED;
                return Some(event);
            }
            self.mailbox.clear();
            event.result = ResultCode::REJECTED;
        }

        if matches!(event.body, EventBody::CancelCheck) {
            self.control.wait_while_paused();
            if !self.control.cancel_requested() {
                event.result = ResultCode::ACCEPTED;
            }
            return Some(event);
        }

        let reply = synchronous.then(|| Arc::clone(&self.mailbox));
        let envelope = Envelope { event, reply };
        if let Err(message) = self.line.send(ControllerMessage::Event(envelope)) {
            let err = RelayError::ControllerGone;
            warn!(error = %err, category = err.category(), "Event not delivered");
            return match message {
                ControllerMessage::Event(envelope) if synchronous => Some(envelope.event),
                _ => None,
            };
        }

        synchronous.then(|| self.mailbox.wait_take())
    }
}

/// What the engine sees of the relay
pub struct EngineHost {
    ctx: Arc<RelayContext>,
    link: Arc<WorkerLink>,
}

impl EngineHost {
    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Logger for a device
    pub fn logger(&self, name: &str) -> DeviceLogger {
        self.ctx.logger(name)
    }

    /// Send an event through the worker's entry point
    pub fn notify(&self, event: Event) -> Option<Event> {
        self.link.notify(event)
    }

    /// Cancellation checkpoint; blocks while the worker is paused
    ///
    /// Always cancels once a fatal is pending.
    pub fn checkpoint(&self) -> Checkpoint {
        if self.ctx.fatal_pending() {
            debug!("Fatal pending, cancelling at checkpoint");
            return Checkpoint::Cancel;
        }
        let result = self
            .notify(self.ctx.event(EventBody::CancelCheck))
            .map(|response| response.result)
            .unwrap_or(ResultCode::REJECTED);
        if result.is_accepted() {
            Checkpoint::Continue
        } else {
            debug!("Cancel observed at checkpoint");
            Checkpoint::Cancel
        }
    }

    /// Ask the controller for a new value of a setting and wait for it
    pub fn request_value(&self, setting: &str) -> ValueOutcome {
        let request = match self.ctx.settings().get(setting) {
            Some(setting) => setting.to_request(),
            None => ValueRequest::new(setting, ""),
        };
        let Some(response) = self.notify(self.ctx.event(EventBody::ValueRequest(request))) else {
            return ValueOutcome::Rejected;
        };
        match (response.result, response.body) {
            (ResultCode::ACCEPTED, EventBody::ValueRequest(req)) => ValueOutcome::Accepted(req.value),
            (ResultCode::CANCELLED, _) => ValueOutcome::Cancelled,
            _ => ValueOutcome::Rejected,
        }
    }

    /// Advance the tick counter shown by `%t`
    pub fn advance_ticks(&self, delta: u64) -> u64 {
        self.ctx.probe().advance_ticks(delta)
    }

    /// Publish the instruction pointer shown by `%i`
    pub fn set_instruction_pointer(&self, ip: u32) {
        self.ctx.probe().set_instruction_pointer(ip);
    }

    /// Consume a pending debugger interrupt request
    pub fn take_interrupt(&self) -> bool {
        self.ctx.take_interrupt()
    }
}

/// Controller-side handle to the worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    control: Arc<WorkerControl>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Ask the worker to stop at its next checkpoint
    ///
    /// Returns `false` if a stop was already requested or the worker is done.
    pub fn request_stop(&self) -> bool {
        let requested = self.control.request_stop();
        if requested {
            info!("Worker stop requested");
        }
        requested
    }

    /// Pause at the next checkpoint; `false` if already paused or stopping
    pub fn pause(&self) -> bool {
        self.control.set_paused(true)
    }

    /// Lift a pause; `false` if not paused
    pub fn resume(&self) -> bool {
        self.control.set_paused(false)
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn state(&self) -> WorkerState {
        self.control.state()
    }

    /// Wait for the thread to finish
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Worker thread panicked outside the engine");
            }
        }
    }
}

/// Start a worker thread running `engine`
pub(crate) fn spawn(
    ctx: Arc<RelayContext>,
    engine: Box<dyn Engine>,
    line: ControllerLine,
) -> RelayResult<WorkerHandle> {
    let control = Arc::new(WorkerControl::new());
    let worker_control = Arc::clone(&control);

    let thread = thread::Builder::new()
        .name("simrelay-worker".to_string())
        .spawn(move || run_worker(ctx, engine, line, worker_control))
        .map_err(RelayError::Spawn)?;

    Ok(WorkerHandle {
        control,
        thread: Some(thread),
    })
}

fn run_worker(
    ctx: Arc<RelayContext>,
    engine: Box<dyn Engine>,
    line: ControllerLine,
    control: Arc<WorkerControl>,
) {
    let link = Arc::new(WorkerLink {
        mailbox: Arc::new(EventMailbox::new()),
        line: line.clone(),
        control: Arc::clone(&control),
        thread: thread::current().id(),
    });
    let target: Arc<dyn NotifyTarget> = link.clone();
    ctx.registry().register(Arc::clone(&target));

    {
        let paused = control.paused.lock();
        let mut state = control.state.lock();
        if *state == WorkerState::Created {
            *state = if *paused {
                WorkerState::Paused
            } else {
                WorkerState::Running
            };
        }
    }
    info!("Worker started");

    let host = EngineHost {
        ctx: Arc::clone(&ctx),
        link,
    };
    let mut exit = match panic::catch_unwind(AssertUnwindSafe(|| engine.run(&host))) {
        Ok(Ok(())) if control.cancel_requested() => WorkerExit::Cancelled,
        Ok(Ok(())) => WorkerExit::Completed,
        Ok(Err(RelayError::Fatal(fatal))) => WorkerExit::Fatal(fatal),
        Ok(Err(e)) => {
            error!(error = %e, category = e.category(), "Engine failed");
            WorkerExit::Failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "Engine panicked");
            WorkerExit::Panicked(message)
        }
    };
    drop(host);

    if let Some(fatal) = ctx.take_fatal() {
        if !matches!(&exit, WorkerExit::Fatal(f) if *f == fatal) {
            warn!(fatal = %fatal, engine_exit = ?exit, "Engine did not stop on a fatal severity");
        }
        exit = WorkerExit::Fatal(fatal);
    }

    ctx.registry().unregister_if(&target);
    control.set_state(WorkerState::Terminated);
    ctx.sink().flush();
    info!(exit = ?exit, "Worker terminated");

    if let WorkerExit::Fatal(fatal) = &exit {
        if ctx.options().on_fatal.ends_process(fatal.reason) {
            fatal_exit(fatal);
        }
    }

    if line.send(ControllerMessage::WorkerExited(exit)).is_err() {
        debug!("Controller gone before worker exit was delivered");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

const BANNER_RULE: &str =
    "========================================================================";

/// Banner printed to stderr when a fatal ends the process
pub fn fatal_banner(fatal: &Fatal) -> String {
    format!(
        "{BANNER_RULE}\nSimulation is exiting with the following message:\n{} {}\n{BANNER_RULE}\n",
        fatal.device, fatal.message
    )
}

/// End the process after a fatal severity; never returns
pub fn fatal_exit(fatal: &Fatal) -> ! {
    error!(device = %fatal.device, reason = %fatal.reason, "Fatal severity, exiting");
    let mut stderr = std::io::stderr().lock();
    let _ = stderr.write_all(fatal_banner(fatal).as_bytes());
    let _ = stderr.flush();
    drop(stderr);
    match fatal.reason {
        FatalReason::DumpCore => std::process::abort(),
        FatalReason::Policy | FatalReason::UserTerminate => std::process::exit(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FatalAction, RelayConfig};
    use crate::severity::{Action, SeverityLevel};
    use crate::sink::LogSink;
    use std::time::Duration;

    fn context() -> Arc<RelayContext> {
        let config = RelayConfig {
            on_fatal: FatalAction::StopWorker,
            ..RelayConfig::default()
        };
        RelayContext::with_sink(config, LogSink::memory().0)
    }

    fn exit_of(rx: &flume::Receiver<ControllerMessage>) -> WorkerExit {
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                ControllerMessage::WorkerExited(exit) => return exit,
                ControllerMessage::Event(envelope) => envelope.respond(),
            }
        }
    }

    #[test]
    fn test_completed_engine() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let mut handle = spawn(Arc::clone(&ctx), Box::new(|_: &EngineHost| -> RelayResult<()> { Ok(()) }), ControllerLine::new(tx)).unwrap();

        assert_eq!(exit_of(&rx), WorkerExit::Completed);
        handle.join();
        assert_eq!(handle.state(), WorkerState::Terminated);
        assert!(!ctx.registry().is_registered());
        assert!(!handle.request_stop());
    }

    #[test]
    fn test_cancel_check_never_reaches_controller() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let (seen_tx, seen_rx) = flume::bounded(1);
        let engine = move |host: &EngineHost| -> RelayResult<()> {
            let first = host.checkpoint();
            let _ = seen_tx.send(first);
            while !host.checkpoint().is_cancel() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();

        assert_eq!(seen_rx.recv().unwrap(), Checkpoint::Continue);
        assert!(handle.request_stop());
        assert!(!handle.request_stop());

        // The only message ever queued is the exit
        match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
            ControllerMessage::WorkerExited(exit) => assert_eq!(exit, WorkerExit::Cancelled),
            ControllerMessage::Event(envelope) => panic!("unexpected event {:?}", envelope.event),
        }
        handle.join();
    }

    #[test]
    fn test_pause_blocks_at_checkpoint_until_resume() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let (tick_tx, tick_rx) = flume::unbounded();
        let engine = move |host: &EngineHost| -> RelayResult<()> {
            while !host.checkpoint().is_cancel() {
                let _ = tick_tx.send(host.advance_ticks(1));
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();

        tick_rx.recv().unwrap();
        assert!(handle.pause());
        assert!(!handle.pause());
        assert!(handle.is_paused());

        // At most one tick slips through before the checkpoint parks
        thread::sleep(Duration::from_millis(30));
        while tick_rx.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(30));
        assert!(tick_rx.try_recv().is_err());

        assert!(handle.resume());
        assert!(tick_rx.recv_timeout(Duration::from_secs(5)).is_ok());

        handle.request_stop();
        assert_eq!(exit_of(&rx), WorkerExit::Cancelled);
        handle.join();
    }

    #[test]
    fn test_stop_wakes_paused_worker() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let engine = |host: &EngineHost| -> RelayResult<()> {
            while !host.checkpoint().is_cancel() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();
        handle.pause();
        thread::sleep(Duration::from_millis(10));
        handle.request_stop();
        assert_eq!(exit_of(&rx), WorkerExit::Cancelled);
        handle.join();
    }

    #[test]
    fn test_fatal_in_stop_worker_mode() {
        let ctx = context();
        ctx.set_log_action(SeverityLevel::Panic, Action::Fatal);
        let (tx, rx) = flume::unbounded();
        let engine = |host: &EngineHost| -> RelayResult<()> {
            host.logger("CPU").panic("triple fault")?;
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();

        match exit_of(&rx) {
            WorkerExit::Fatal(fatal) => {
                assert_eq!(fatal.reason, FatalReason::Policy);
                assert_eq!(fatal.message, "triple fault");
            }
            other => panic!("expected fatal exit, got {other:?}"),
        }
        handle.join();
    }

    #[test]
    fn test_discarded_fatal_still_ends_worker() {
        let config = RelayConfig {
            on_fatal: FatalAction::StopWorker,
            ..RelayConfig::non_interactive()
        };
        let (sink, buffer) = LogSink::memory();
        let ctx = RelayContext::with_sink(config, sink);
        let (tx, rx) = flume::unbounded();
        let (checkpoint_tx, checkpoint_rx) = flume::bounded(1);
        let engine = move |host: &EngineHost| -> RelayResult<()> {
            let cpu = host.logger("CPU");
            let _ = cpu.panic("fatal one");
            let _ = checkpoint_tx.send(host.checkpoint());
            let _ = cpu.info("still running after fatal");
            Ok(())
        };
        let mut handle = spawn(Arc::clone(&ctx), Box::new(engine), ControllerLine::new(tx)).unwrap();

        match exit_of(&rx) {
            WorkerExit::Fatal(fatal) => {
                assert_eq!(fatal.reason, FatalReason::Policy);
                assert_eq!(fatal.message, "fatal one");
            }
            other => panic!("expected fatal exit, got {other:?}"),
        }
        assert_eq!(checkpoint_rx.recv().unwrap(), Checkpoint::Cancel);
        handle.join();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("p[CPU  ] >>PANIC<< fatal one"));
        // The latch is consumed with the worker
        assert!(!ctx.fatal_pending());
    }

    #[test]
    fn test_pause_before_worker_starts() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let engine = |host: &EngineHost| -> RelayResult<()> {
            while !host.checkpoint().is_cancel() {
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();
        assert!(handle.pause());
        assert_eq!(handle.state(), WorkerState::Paused);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(handle.state(), WorkerState::Paused);
        assert!(handle.is_paused());

        assert!(handle.request_stop());
        assert!(!handle.is_paused());
        assert!(!handle.resume());
        assert_eq!(handle.state(), WorkerState::CancelRequested);

        assert_eq!(exit_of(&rx), WorkerExit::Cancelled);
        handle.join();
        assert_eq!(handle.state(), WorkerState::Terminated);
    }

    #[test]
    fn test_engine_panic_is_caught() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let engine = |_: &EngineHost| -> RelayResult<()> { panic!("engine exploded") };
        let mut handle = spawn(Arc::clone(&ctx), Box::new(engine), ControllerLine::new(tx)).unwrap();

        assert_eq!(exit_of(&rx), WorkerExit::Panicked("engine exploded".to_string()));
        handle.join();
        assert!(!ctx.registry().is_registered());
    }

    #[test]
    fn test_engine_error_is_failure() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        let engine = |_: &EngineHost| -> RelayResult<()> { Err(RelayError::engine("disk image missing")) };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();

        let exit = exit_of(&rx);
        assert!(exit.is_failure());
        assert_eq!(exit, WorkerExit::Failed("Engine error: disk image missing".to_string()));
        handle.join();
    }

    #[test]
    fn test_sync_event_without_controller_is_rejected() {
        let ctx = context();
        let (tx, rx) = flume::unbounded();
        drop(rx);
        let (result_tx, result_rx) = flume::bounded(1);
        let engine = move |host: &EngineHost| -> RelayResult<()> {
            let _ = result_tx.send(host.request_value("boot-device"));
            Ok(())
        };
        let mut handle = spawn(ctx, Box::new(engine), ControllerLine::new(tx)).unwrap();
        assert_eq!(result_rx.recv().unwrap(), ValueOutcome::Rejected);
        handle.join();
    }

    #[test]
    fn test_closed_line_refuses_sends() {
        let (tx, rx) = flume::unbounded();
        let line = ControllerLine::new(tx);
        let writer = line.clone();
        assert!(writer.send(ControllerMessage::WorkerExited(WorkerExit::Completed)).is_ok());

        line.close();
        let refused = writer.send(ControllerMessage::WorkerExited(WorkerExit::Cancelled));
        assert!(matches!(refused, Err(ControllerMessage::WorkerExited(WorkerExit::Cancelled))));

        // Only the message sent before closing was queued
        assert!(matches!(rx.try_recv(), Ok(ControllerMessage::WorkerExited(WorkerExit::Completed))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fatal_banner() {
        let fatal = Fatal::new(FatalReason::Policy, "[CPU  ]", "triple fault");
        let banner = fatal_banner(&fatal);
        assert!(banner.starts_with(BANNER_RULE));
        assert!(banner.contains("[CPU  ] triple fault\n"));
        assert!(banner.ends_with(&format!("{BANNER_RULE}\n")));
    }
}
