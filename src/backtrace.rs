//! Backtrace enhancer - best-effort recovery of the logging call site.
//!
//! When a log call arrives without `%function`/`%file`/`%line`, the
//! enhancer scans a caller-supplied stack snapshot for the first frame
//! that is not part of the logging machinery itself and lifts its
//! coordinates into the placeholders. The information is advisory:
//! frames may lack a file or line, and the fields then stay unset.

use crate::placeholders::Placeholders;

/// Upper bound on the number of frames inspected per trace.
pub const MAX_BACKTRACE_DEPTH: usize = 10;

/// Function names that never count as the origin of a log call:
/// the logger's own entry points, channel dispatch, and error-handler
/// glue an embedding application routes errors through.
const IGNORED_FUNCTIONS: &[&str] = &[
    "Logger::log",
    "Logger::emergency",
    "Logger::alert",
    "Logger::critical",
    "Logger::error",
    "Logger::warning",
    "Logger::notice",
    "Logger::info",
    "Logger::debug",
    "LoggerChannel::log",
    "error_handler",
    "log_error",
];

/// The top-level adapter that turns an uncaught exception into a log
/// call. Its own coordinates are meaningless; the carried exception
/// trace holds the real origin.
const EXCEPTION_HANDLER: &str = "exception_handler";

/// One frame of a call-stack snapshot supplied with a log call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackFrame {
    pub function: String,
    pub class: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Backtrace of the exception carried by an exception-handler
    /// frame; empty everywhere else.
    pub exception_trace: Vec<StackFrame>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> Self {
        StackFrame {
            function: function.into(),
            ..StackFrame::default()
        }
    }

    pub fn in_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_exception_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.exception_trace = trace;
        self
    }

    /// `Class::method` when a class is present, the bare function name
    /// otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.class {
            Some(class) => format!("{}::{}", class, self.function),
            None => self.function.clone(),
        }
    }
}

/// Fill `%function`, `%file` and `%line` from the first acceptable
/// frame of `frames`. Returns whether a frame was accepted.
pub fn enhance(placeholders: &mut Placeholders, frames: &[StackFrame]) -> bool {
    for frame in frames.iter().take(MAX_BACKTRACE_DEPTH) {
        let function = frame.qualified_name();
        if IGNORED_FUNCTIONS.contains(&function.as_str()) {
            continue;
        }

        if frame.function == EXCEPTION_HANDLER {
            // The handler frame points at the handler, not the error:
            // continue the scan inside the exception's own trace.
            if enhance(placeholders, &frame.exception_trace) {
                return true;
            }
            continue;
        }

        placeholders.function = Some(function);
        placeholders.file = frame.file.clone();
        placeholders.line = frame.line;
        return true;
    }

    false
}
