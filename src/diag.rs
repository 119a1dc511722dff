/*!
The `diag` module routes human-readable diagnostics out of the library. Parsing a damaged file
produces messages at several severities; the consuming program decides where they go by installing
a [`DiagnosticSink`] once at startup. When no sink is installed, diagnostics are dropped and
failures are visible only through return values.

This is separate from the `log` crate: `log` carries developer tracing, the sink carries messages
meant for the user of a frontend program.
!*/

use std::fmt;
use std::sync::OnceLock;

/// How serious a diagnostic message is.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd, Hash)]
pub enum Severity {
    /// General text output, e.g. listings requested by the user.
    Note,
    /// A non-fatal oddity in an otherwise readable file.
    Warn,
    /// A recoverable violation of the file format.
    Error,
    /// An unrecoverable failure, e.g. a system-level error.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warn => write!(f, "warning"),
            Severity::Error => write!(f, "mferror"),
            Severity::Fatal => write!(f, "error"),
        }
    }
}

/// Receives every diagnostic message the library produces.
pub trait DiagnosticSink: Send + Sync {
    /// Called once per message. `message` is already formatted; implementations typically add a
    /// severity prefix and a file name.
    fn emit(&self, severity: Severity, message: fmt::Arguments<'_>);
}

static SINK: OnceLock<Box<dyn DiagnosticSink>> = OnceLock::new();

/// Install the process-wide diagnostic sink. Returns `false` if a sink was already installed, in
/// which case the new sink is dropped and the old one stays in effect.
pub fn install_sink(sink: Box<dyn DiagnosticSink>) -> bool {
    SINK.set(sink).is_ok()
}

/// Send one message to the installed sink, if any.
pub fn emit(severity: Severity, message: fmt::Arguments<'_>) {
    if let Some(sink) = SINK.get() {
        sink.emit(severity, message);
    }
}

macro_rules! diag {
    ($severity:expr, $($arg:tt)*) => {
        crate::diag::emit($severity, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capture {
        lines: Mutex<Vec<(Severity, String)>>,
    }

    impl DiagnosticSink for Capture {
        fn emit(&self, severity: Severity, message: fmt::Arguments<'_>) {
            self.lines
                .lock()
                .unwrap()
                .push((severity, format!("{}", message)));
        }
    }

    #[test]
    fn severity_order() {
        assert!(Severity::Note < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn emit_without_sink_is_silent() {
        // No sink is installed in the library's unit test binary; this must simply not panic.
        emit(Severity::Warn, format_args!("nobody listening"));
        diag!(Severity::Error, "still nobody listening {}", 1);
    }

    #[test]
    fn capture_formats_message() {
        let capture = Capture {
            lines: Mutex::new(Vec::new()),
        };
        capture.emit(Severity::Warn, format_args!("{} bytes skipped", 3));
        let lines = capture.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, Severity::Warn);
        assert_eq!(lines[0].1, "3 bytes skipped");
    }
}
