//! Destination for recorded severity messages
//!
//! This is the simulator's own log (what REPORT writes), kept apart from the
//! relay's `tracing` diagnostics. Every line is flushed as soon as it is written.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Where recorded lines go
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    Stdout,
    File(PathBuf),
    Memory(SharedBuffer),
}

impl LogTarget {
    /// Interpret a configured log file name
    ///
    /// `-` means stderr. The standard streams can also be named by their
    /// `/dev` paths.
    pub fn from_spec(spec: &str) -> Self {
        match spec {
            "-" | "" | "/dev/stderr" => LogTarget::Stderr,
            "/dev/stdout" => LogTarget::Stdout,
            path => LogTarget::File(PathBuf::from(path)),
        }
    }
}

/// In-memory log buffer, shareable between the sink and a reader
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Written lines, without terminators
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Line-oriented, thread-safe log writer
pub struct LogSink {
    name: String,
    out: Mutex<Box<dyn Write + Send>>,
}

impl LogSink {
    /// Open a target; a file that cannot be created falls back to stderr
    pub fn open(target: LogTarget) -> Self {
        match target {
            LogTarget::Stderr => Self::new("/dev/stderr", Box::new(io::stderr())),
            LogTarget::Stdout => Self::new("/dev/stdout", Box::new(io::stdout())),
            LogTarget::Memory(buffer) => Self::new("(memory)", Box::new(buffer)),
            LogTarget::File(path) => match File::create(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), "Opened log file");
                    Self::new(path.display().to_string(), Box::new(file))
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Couldn't open log file, using stderr");
                    Self::new("/dev/stderr", Box::new(io::stderr()))
                }
            },
        }
    }

    /// Sink writing into a fresh in-memory buffer
    pub fn memory() -> (Self, SharedBuffer) {
        let buffer = SharedBuffer::new();
        (Self::open(LogTarget::Memory(buffer.clone())), buffer)
    }

    fn new(name: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            name: name.into(),
            out: Mutex::new(out),
        }
    }

    /// Name of the destination, e.g. a file path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one line and flush it
    pub fn record(&self, line: &str) {
        let mut out = self.out.lock();
        let result = writeln!(out, "{line}").and_then(|_| out.flush());
        if let Err(e) = result {
            warn!(sink = %self.name, error = %e, "Failed to write log line");
        }
    }

    /// Flush pending output
    pub fn flush(&self) {
        if let Err(e) = self.out.lock().flush() {
            warn!(sink = %self.name, error = %e, "Failed to flush log");
        }
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_records_lines() {
        let (sink, buffer) = LogSink::memory();
        sink.record("first");
        sink.record("second");
        assert_eq!(buffer.lines(), vec!["first", "second"]);
        assert_eq!(sink.name(), "(memory)");
    }

    #[test]
    fn test_file_sink() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sim.log");

        let sink = LogSink::open(LogTarget::File(path.clone()));
        sink.record("00000000001i[IO   ] ready");
        sink.flush();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "00000000001i[IO   ] ready\n");
    }

    #[test]
    fn test_unwritable_file_falls_back_to_stderr() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing-dir").join("sim.log");
        let sink = LogSink::open(LogTarget::File(path));
        assert_eq!(sink.name(), "/dev/stderr");
    }

    #[test]
    fn test_stdout_sink() {
        let sink = LogSink::open(LogTarget::from_spec("/dev/stdout"));
        assert_eq!(sink.name(), "/dev/stdout");
        sink.record("00000000000i[IO   ] to stdout");
    }

    #[test]
    fn test_target_from_spec() {
        assert!(matches!(LogTarget::from_spec("-"), LogTarget::Stderr));
        assert!(matches!(LogTarget::from_spec("/dev/stderr"), LogTarget::Stderr));
        assert!(matches!(LogTarget::from_spec("/dev/stdout"), LogTarget::Stdout));
        assert!(matches!(LogTarget::from_spec("out.txt"), LogTarget::File(p) if p == PathBuf::from("out.txt")));
    }
}
