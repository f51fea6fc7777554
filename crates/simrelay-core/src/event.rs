//! Events exchanged between the worker and the controller
//!
//! An [`Event`] is produced on the worker thread and owned by exactly one side
//! at a time. Ownership moves to the controller through the hand-off queue and
//! comes back through the worker's [`EventMailbox`](crate::mailbox::EventMailbox).
//!
//! # Result codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `0` | accepted / continue |
//! | `< 0` | rejected, cancelled, or "stop" for a cancel check |
//! | `> 0` | enumerated user choice (severity asks) |

use std::fmt;

use crate::settings::SettingFlags;
use crate::severity::SeverityLevel;

/// Identifier used to correlate a request with its response in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Integer result carried by every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    /// Request accepted, or "keep running" for a cancel check
    pub const ACCEPTED: ResultCode = ResultCode(0);
    /// Default for synchronous events nobody answered; "stop" for a cancel check
    pub const REJECTED: ResultCode = ResultCode(-1);
    /// The user dismissed the prompt
    pub const CANCELLED: ResultCode = ResultCode(-2);

    /// Wrap a raw code
    pub fn new(code: i32) -> Self {
        Self(code)
    }

    /// Raw integer value
    pub fn code(self) -> i32 {
        self.0
    }

    /// Check if the code is zero
    pub fn is_accepted(self) -> bool {
        self.0 == 0
    }

    /// Check if the code is negative
    pub fn is_rejected(self) -> bool {
        self.0 < 0
    }

    /// Positive codes are enumerated choices
    pub fn choice(self) -> Option<u32> {
        u32::try_from(self.0).ok().filter(|c| *c > 0)
    }
}

impl Default for ResultCode {
    fn default() -> Self {
        Self::ACCEPTED
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a value should be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Free-form text input
    Text,
    /// Pick an existing file
    OpenFile,
    /// Pick a file to write
    SaveFile,
}

/// Payload of a value request: the target setting and its current value
///
/// The controller writes the new value into `value` before answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRequest {
    /// Setting identifier
    pub setting: String,
    /// Current value; replaced by the accepted value in the response
    pub value: String,
    /// Path flags copied from the setting
    pub flags: SettingFlags,
    /// Text to show the user
    pub prompt: String,
}

impl ValueRequest {
    /// Create a plain text request
    pub fn new(setting: impl Into<String>, value: impl Into<String>) -> Self {
        let setting = setting.into();
        Self {
            prompt: setting.clone(),
            setting,
            value: value.into(),
            flags: SettingFlags::empty(),
        }
    }

    /// Set the path flags
    pub fn with_flags(mut self, flags: SettingFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the prompt text
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Which input flavor the flags call for
    pub fn kind(&self) -> ValueKind {
        if !self.flags.contains(SettingFlags::IS_FILENAME) {
            ValueKind::Text
        } else if self.flags.contains(SettingFlags::SAVE_FILE_DIALOG) {
            ValueKind::SaveFile
        } else {
            ValueKind::OpenFile
        }
    }
}

/// A formatted severity message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityRecord {
    /// Severity of the message
    pub level: SeverityLevel,
    /// Rendered device tag, e.g. `[FDD  ]`
    pub device: String,
    /// Message body without the prefix
    pub message: String,
}

impl SeverityRecord {
    /// Create a record
    pub fn new(level: SeverityLevel, device: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            device: device.into(),
            message: message.into(),
        }
    }
}

/// Closed set of event payloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    /// Ask the controller for a new setting value (synchronous)
    ValueRequest(ValueRequest),
    /// Ask the controller what to do about a severity (synchronous)
    SeverityAsk(SeverityRecord),
    /// Deliver a log record for display (asynchronous)
    SeverityNotify(SeverityRecord),
    /// Periodic cancellation checkpoint, answered on the worker thread
    CancelCheck,
    /// Anything else an engine wants to relay
    Other {
        /// Engine-defined code
        code: u32,
        /// Whether the producer waits for a response
        synchronous: bool,
        /// Optional free text
        detail: Option<String>,
    },
}

/// Discriminant of [`EventBody`], used for logging and dispatch tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ValueRequest,
    SeverityAsk,
    SeverityNotify,
    CancelCheck,
    Other(u32),
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::ValueRequest => f.write_str("value_request"),
            EventKind::SeverityAsk => f.write_str("severity_ask"),
            EventKind::SeverityNotify => f.write_str("severity_notify"),
            EventKind::CancelCheck => f.write_str("cancel_check"),
            EventKind::Other(code) => write!(f, "other({code})"),
        }
    }
}

/// An event travelling between the worker and the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    id: EventId,
    /// Kind-specific payload
    pub body: EventBody,
    /// Response code set by whoever answers the event
    pub result: ResultCode,
}

impl Event {
    /// Create an event with a result of "accepted"
    pub fn new(id: EventId, body: EventBody) -> Self {
        Self {
            id,
            body,
            result: ResultCode::ACCEPTED,
        }
    }

    /// Event identity
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Discriminant of the payload
    pub fn kind(&self) -> EventKind {
        match &self.body {
            EventBody::ValueRequest(_) => EventKind::ValueRequest,
            EventBody::SeverityAsk(_) => EventKind::SeverityAsk,
            EventBody::SeverityNotify(_) => EventKind::SeverityNotify,
            EventBody::CancelCheck => EventKind::CancelCheck,
            EventBody::Other { code, .. } => EventKind::Other(*code),
        }
    }

    /// Whether the producer blocks until a response arrives
    pub fn is_synchronous(&self) -> bool {
        match &self.body {
            EventBody::ValueRequest(_) | EventBody::SeverityAsk(_) | EventBody::CancelCheck => true,
            EventBody::SeverityNotify(_) => false,
            EventBody::Other { synchronous, .. } => *synchronous,
        }
    }

    /// The value request payload, if this is one
    pub fn value_request(&self) -> Option<&ValueRequest> {
        match &self.body {
            EventBody::ValueRequest(req) => Some(req),
            _ => None,
        }
    }

    /// The severity payload of an ask or a notify
    pub fn severity(&self) -> Option<&SeverityRecord> {
        match &self.body {
            EventBody::SeverityAsk(rec) | EventBody::SeverityNotify(rec) => Some(rec),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronous_classification() {
        let id = EventId(1);
        let notify = Event::new(
            id,
            EventBody::SeverityNotify(SeverityRecord::new(SeverityLevel::Info, "[IO   ]", "ready")),
        );
        assert!(!notify.is_synchronous());

        let ask = Event::new(
            id,
            EventBody::SeverityAsk(SeverityRecord::new(SeverityLevel::Panic, "[IO   ]", "bad")),
        );
        assert!(ask.is_synchronous());
        assert!(Event::new(id, EventBody::CancelCheck).is_synchronous());

        let other = Event::new(
            id,
            EventBody::Other {
                code: 7,
                synchronous: false,
                detail: None,
            },
        );
        assert!(!other.is_synchronous());
        assert_eq!(other.kind(), EventKind::Other(7));
    }

    #[test]
    fn test_value_kind_from_flags() {
        let req = ValueRequest::new("floppya", "a.img");
        assert_eq!(req.kind(), ValueKind::Text);

        let req = req.with_flags(SettingFlags::IS_FILENAME);
        assert_eq!(req.kind(), ValueKind::OpenFile);

        let req = req.with_flags(SettingFlags::IS_FILENAME | SettingFlags::SAVE_FILE_DIALOG);
        assert_eq!(req.kind(), ValueKind::SaveFile);
    }

    #[test]
    fn test_result_code_helpers() {
        assert!(ResultCode::ACCEPTED.is_accepted());
        assert!(ResultCode::REJECTED.is_rejected());
        assert!(ResultCode::CANCELLED.is_rejected());
        assert_eq!(ResultCode::new(3).choice(), Some(3));
        assert_eq!(ResultCode::ACCEPTED.choice(), None);
        assert_eq!(ResultCode::REJECTED.choice(), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(EventKind::CancelCheck.to_string(), "cancel_check");
        assert_eq!(EventKind::Other(9).to_string(), "other(9)");
    }
}
