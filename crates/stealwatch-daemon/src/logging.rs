//! Log sink selection.
//!
//! In the foreground records go to stderr through `tracing_subscriber::fmt`.
//! A daemonized process has no terminal, so records go to syslog instead.

use std::ffi::{CStr, CString};
use std::fmt::Write as _;
use std::io::IsTerminal;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Syslog identity.
const SYSLOG_IDENT: &CStr = c"stealwatchd";

/// Where log records go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    /// Formatted records on stderr.
    Stderr,
    /// The system log.
    Syslog,
}

/// Default filter directives for a verbosity level.
pub fn default_directives(level: &str) -> String {
    format!("stealwatch_core={level},stealwatch_daemon={level},stealwatch_common={level}")
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, sink: LogSink) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let registry = tracing_subscriber::registry().with(filter);

    match sink {
        LogSink::Stderr => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(false),
            )
            .init(),
        LogSink::Syslog => registry.with(SyslogLayer::open()).init(),
    }
}

/// Syslog priority for a tracing level. Debug and trace are logged as info.
pub fn syslog_priority(level: Level) -> libc::c_int {
    if level == Level::ERROR {
        libc::LOG_ERR
    } else if level == Level::WARN {
        libc::LOG_WARNING
    } else {
        libc::LOG_INFO
    }
}

/// Forwards events to `syslog(3)`.
#[derive(Debug)]
pub struct SyslogLayer {
    _private: (),
}

impl SyslogLayer {
    /// Open the system log with the daemon identity.
    pub fn open() -> Self {
        // SAFETY: the ident is a 'static C string, as openlog requires.
        unsafe { libc::openlog(SYSLOG_IDENT.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON) };
        Self { _private: () }
    }
}

impl Drop for SyslogLayer {
    fn drop(&mut self) {
        // SAFETY: no arguments, safe after openlog.
        unsafe { libc::closelog() };
    }
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let Ok(line) = CString::new(visitor.into_line().replace('\0', " ")) else {
            return;
        };
        let priority = syslog_priority(*event.metadata().level());
        // SAFETY: constant "%s" format with one valid C string argument.
        unsafe { libc::syslog(priority, c"%s".as_ptr(), line.as_ptr()) };
    }
}

/// Renders the message followed by `key=value` fields.
#[derive(Debug, Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn into_line(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }
}
