//! Foreground controller
//!
//! The controller owns the front end and the receiving end of the worker's
//! hand-off queue. It never blocks on the worker. The host calls
//! [`Controller::dispatch_pending`] or [`Controller::wait_and_dispatch`] from
//! its own event loop, and each call handles a bounded batch of messages.
//!
//! Every synchronous event that reaches the controller gets an answer, even
//! kinds it has no handler for, so the worker is never left waiting.

use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use tracing::{debug, info, warn};

use crate::context::RelayContext;
use crate::error::{RelayError, RelayResult};
use crate::event::{Event, EventBody, ResultCode, SeverityRecord, ValueKind, ValueRequest};
use crate::severity::AskChoice;
use crate::worker::{
    self, ControllerLine, ControllerMessage, Engine, Envelope, WorkerExit, WorkerHandle, WorkerState,
};

/// A value prompt as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePrompt {
    pub setting: String,
    pub prompt: String,
    pub current: String,
    pub kind: ValueKind,
}

/// A severity question as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityAsk {
    pub record: SeverityRecord,
    /// Whether [`AskChoice::Debug`] may be offered
    pub debug_enabled: bool,
}

/// User-facing collaborator driven by the controller
pub trait Frontend {
    /// Ask for a new value; `None` or an empty string means cancelled
    fn request_value(&mut self, prompt: &ValuePrompt) -> Option<String>;

    /// Ask what to do about a severity
    fn ask_severity(&mut self, ask: &SeverityAsk) -> AskChoice;

    /// Bring the front end to the user's attention
    fn raise(&mut self) {}
}

/// Worker lifecycle changes published to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Started,
    /// `unexpected` is set when the worker failed without being asked to stop
    Stopped { unexpected: bool },
    Paused,
    Resumed,
}

type NotificationHandler = Box<dyn FnMut(&Event)>;
type ExitCallback = Box<dyn FnMut(&WorkerExit)>;
type StatusListener = Box<dyn FnMut(StatusChange)>;

pub struct Controller {
    ctx: Arc<RelayContext>,
    frontend: Box<dyn Frontend>,
    line: ControllerLine,
    rx: Receiver<ControllerMessage>,
    worker: Option<WorkerHandle>,
    notification_handlers: Vec<NotificationHandler>,
    exit_callbacks: Vec<ExitCallback>,
    status_listeners: Vec<StatusListener>,
    starts: u32,
    stop_requested: bool,
    last_exit: Option<WorkerExit>,
}

impl Controller {
    pub fn new(ctx: Arc<RelayContext>, frontend: impl Frontend + 'static) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            ctx,
            frontend: Box::new(frontend),
            line: ControllerLine::new(tx),
            rx,
            worker: None,
            notification_handlers: Vec::new(),
            exit_callbacks: Vec::new(),
            status_listeners: Vec::new(),
            starts: 0,
            stop_requested: false,
            last_exit: None,
        }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Called for every asynchronous event that reaches the controller
    pub fn on_notification(&mut self, handler: impl FnMut(&Event) + 'static) {
        self.notification_handlers.push(Box::new(handler));
    }

    /// Called once each time a worker terminates
    pub fn on_worker_exit(&mut self, callback: impl FnMut(&WorkerExit) + 'static) {
        self.exit_callbacks.push(Box::new(callback));
    }

    pub fn on_status_change(&mut self, listener: impl FnMut(StatusChange) + 'static) {
        self.status_listeners.push(Box::new(listener));
    }

    /// Start a worker running `engine`
    pub fn start(&mut self, engine: impl Engine) -> RelayResult<()> {
        if self.worker.is_some() {
            warn!("Start requested while a worker is running");
            return Err(RelayError::AlreadyRunning);
        }

        let handle = worker::spawn(Arc::clone(&self.ctx), Box::new(engine), self.line.clone())?;
        self.starts += 1;
        if self.starts > 1 {
            warn!(starts = self.starts, "Restarting in the same session; state from earlier runs is not reset");
        }
        self.worker = Some(handle);
        self.stop_requested = false;
        self.last_exit = None;
        info!("Simulation started");
        self.publish(StatusChange::Started);
        Ok(())
    }

    /// Ask the worker to stop at its next checkpoint
    ///
    /// Returns `false` without doing anything if there is no worker or a stop
    /// was already requested.
    pub fn request_stop(&mut self) -> bool {
        let Some(worker) = &self.worker else {
            return false;
        };
        if worker.request_stop() {
            self.stop_requested = true;
            true
        } else {
            false
        }
    }

    pub fn pause(&mut self) -> RelayResult<()> {
        let worker = self.worker.as_ref().ok_or(RelayError::NotRunning)?;
        if worker.pause() {
            info!("Simulation paused");
            self.publish(StatusChange::Paused);
        }
        Ok(())
    }

    pub fn resume(&mut self) -> RelayResult<()> {
        let worker = self.worker.as_ref().ok_or(RelayError::NotRunning)?;
        if worker.resume() {
            info!("Simulation resumed");
            self.publish(StatusChange::Resumed);
        }
        Ok(())
    }

    pub fn toggle_pause(&mut self) -> RelayResult<()> {
        if self.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    pub fn is_paused(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerHandle::is_paused)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn worker_state(&self) -> Option<WorkerState> {
        self.worker.as_ref().map(WorkerHandle::state)
    }

    /// Number of successful starts this session
    pub fn starts(&self) -> u32 {
        self.starts
    }

    /// How the most recent worker ended
    pub fn last_exit(&self) -> Option<&WorkerExit> {
        self.last_exit.as_ref()
    }

    /// Handle queued messages without waiting, at most one batch
    pub fn dispatch_pending(&mut self) -> usize {
        self.drain(self.ctx.dispatch_batch())
    }

    /// Wait up to `timeout` for a message, then handle at most one batch
    pub fn wait_and_dispatch(&mut self, timeout: Duration) -> usize {
        let Ok(message) = self.rx.recv_timeout(timeout) else {
            return 0;
        };
        self.handle(message);
        1 + self.drain(self.ctx.dispatch_batch() - 1)
    }

    fn drain(&mut self, limit: usize) -> usize {
        let mut handled = 0;
        while handled < limit {
            let Ok(message) = self.rx.try_recv() else {
                break;
            };
            self.handle(message);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Event(envelope) => self.handle_event(envelope),
            ControllerMessage::WorkerExited(exit) => self.handle_exit(exit),
        }
    }

    fn handle_event(&mut self, mut envelope: Envelope) {
        let synchronous = envelope.expects_reply();
        let event = &mut envelope.event;
        let (id, kind) = (event.id(), event.kind());
        debug!(event_id = %id, %kind, "Dispatching event");

        let result = match &mut event.body {
            EventBody::ValueRequest(request) => Some(self.resolve_value(request)),
            EventBody::SeverityAsk(record) => {
                let choice = self.ask_severity(record);
                debug!(event_id = %id, ?choice, "Severity ask resolved");
                Some(choice.result())
            }
            EventBody::SeverityNotify(_) => None,
            EventBody::CancelCheck => {
                warn!(event_id = %id, "Cancel check reached the controller, answering stop");
                Some(ResultCode::REJECTED)
            }
            EventBody::Other { .. } if synchronous => {
                warn!(event_id = %id, %kind, "Unhandled synchronous event, sending default response");
                Some(ResultCode::REJECTED)
            }
            EventBody::Other { .. } => None,
        };

        match result {
            Some(result) => event.result = result,
            None => {
                for handler in &mut self.notification_handlers {
                    handler(&envelope.event);
                }
            }
        }
        envelope.respond();
    }

    fn ask_severity(&mut self, record: &SeverityRecord) -> AskChoice {
        self.frontend.raise();
        let ask = SeverityAsk {
            record: record.clone(),
            debug_enabled: self.ctx.options().debugger,
        };
        self.frontend.ask_severity(&ask)
    }

    fn resolve_value(&mut self, request: &mut ValueRequest) -> ResultCode {
        self.frontend.raise();

        let settings = self.ctx.settings();
        if !settings.contains(&request.setting) {
            warn!(setting = %request.setting, "Value request for unknown setting");
            return ResultCode::REJECTED;
        }

        let prompt = ValuePrompt {
            setting: request.setting.clone(),
            prompt: request.prompt.clone(),
            current: request.value.clone(),
            kind: request.kind(),
        };
        match self.frontend.request_value(&prompt) {
            Some(value) if !value.is_empty() => match settings.set(&request.setting, value.as_str()) {
                Ok(()) => {
                    request.value = value;
                    ResultCode::ACCEPTED
                }
                Err(e) => {
                    warn!(setting = %request.setting, error = %e, "Could not apply value");
                    ResultCode::REJECTED
                }
            },
            _ => {
                debug!(setting = %request.setting, "Value request cancelled");
                ResultCode::CANCELLED
            }
        }
    }

    fn handle_exit(&mut self, exit: WorkerExit) {
        if let Some(mut worker) = self.worker.take() {
            worker.join();
        }
        let unexpected = exit.is_failure() && !self.stop_requested;
        info!(exit = ?exit, unexpected, "Simulation stopped");

        for callback in &mut self.exit_callbacks {
            callback(&exit);
        }
        self.last_exit = Some(exit);
        self.stop_requested = false;
        self.publish(StatusChange::Stopped { unexpected });
    }

    fn publish(&mut self, change: StatusChange) {
        for listener in &mut self.status_listeners {
            listener(change);
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.request_stop() {
            debug!("Controller dropped with a running worker");
        }
        // Nothing can be queued after this, so the drain below answers every
        // event a worker may still be waiting on
        self.line.close();
        while let Ok(message) = self.rx.try_recv() {
            if let ControllerMessage::Event(mut envelope) = message {
                if envelope.expects_reply() {
                    envelope.event.result = ResultCode::REJECTED;
                }
                envelope.respond();
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("worker", &self.worker_state())
            .field("starts", &self.starts)
            .field("stop_requested", &self.stop_requested)
            .finish_non_exhaustive()
    }
}
