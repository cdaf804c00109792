use crate::log_matcher::extract_log_lines;
use crate::signal::Signal;
use std::time::Duration;

/// What the execution layer reports for one executed input.
///
/// The scoring core only reads outcomes. A zero `elapsed` means the time was
/// not measured, and a missing or empty `signal` means no coverage was
/// collected; both degrade to a zero contribution for their dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub signal: Option<Signal>,
    pub elapsed: Duration,
    pub log_lines: Vec<String>,
    pub crashed: bool,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_log_lines<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.log_lines.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Appends the diagnostic lines found in raw target output.
    pub fn with_output(mut self, output: &str) -> Self {
        self.log_lines.extend(extract_log_lines(output));
        self
    }

    pub fn with_crash(mut self, error: Option<String>) -> Self {
        self.crashed = true;
        self.error = error;
        self
    }

    pub fn has_signal(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| !s.is_empty())
    }
}
