//! Logging bootstrap shared by every binary and test in the workspace.
//!
//! A terminal drain is used for interactive runs; a daemonized server
//! switches to a plain stdout drain so `/var/log/zway` stays readable once
//! redirected there by the process launcher. Every long-lived component
//! (session, store pool, stream pool, server supervisor) keeps its own
//! child `slog::Logger` built with `o!()` key/value context rather than
//! formatting ids into message strings.

pub use slog::{self, debug, error, info, o, trace, warn, Logger};

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::Severity;
use sloggers::Build;

/// Build the root logger for an interactive (non-daemonized) run: a
/// terminal drain at debug level, writing to stderr.
pub fn init() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Debug);
    builder.destination(Destination::Stderr);
    builder.build().expect("failed to build terminal logger")
}

/// Build the root logger for a daemonized run. The process launcher (out of
/// scope, `spec.md` §1) is responsible for redirecting stdout to
/// `/var/log/zway`.
pub fn init_daemon() -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(Severity::Info);
    builder.destination(Destination::Stdout);
    builder.build().expect("failed to build daemon logger")
}

/// A logger that discards everything, used in tests and as a fallback
/// default before a real root logger is available.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}
