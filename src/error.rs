//! Error taxonomy for the runtime.
//!
//! Cancellation is modelled as an [`Error`] variant so it can travel through
//! `?`, but it is never a failure: [`Error::is_cancelled`] lets callers tell the
//! two apart, and the render bridge never shows a crash for it.
//!
//! Once an error leaves the task that raised it, it travels as
//! [`Error::Failed`] (or [`Error::Panicked`]) so every frame it crosses can
//! be recorded. [`Error::origin`] recovers the variant that was first raised.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way a task or operation can end without a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The task was halted before it produced a value.
    #[error("task was cancelled")]
    Cancelled,

    /// A context lookup found no binding in the ownership chain.
    #[error("context missing: {name}")]
    ContextMissing { name: &'static str },

    /// A task body returned an error.
    #[error("{0}")]
    Failed(Failure),

    /// A task body panicked while being polled.
    #[error("panicked: {0}")]
    Panicked(Failure),

    /// A resource setup finished without calling `provide`.
    #[error("resource `{name}` exited without providing a value")]
    ResourceNotProvided { name: String },

    /// `block_on` found nothing runnable for longer than the stall timeout.
    #[error("runtime stalled with no runnable tasks")]
    Stalled,

    /// A task handle was awaited after its outcome had been taken.
    #[error("task outcome was already taken")]
    OutcomeTaken,
}

impl Error {
    /// Build a user failure from any displayable message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Error::Failed(Failure::new(message.to_string()))
    }

    /// Wrap a foreign error as a user failure, keeping its source chain in
    /// the message.
    pub fn from_std(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Error::msg(message)
    }

    /// Whether this is the cancellation outcome rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The failure details, if this error carries any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Error::Failed(failure) | Error::Panicked(failure) => Some(failure),
            _ => None,
        }
    }

    /// Record that this error passed through the named frame.
    ///
    /// Cancellation carries no trace and is returned unchanged.
    pub(crate) fn traced(self, frame: impl Into<String>) -> Self {
        match self {
            Error::Failed(failure) => Error::Failed(failure.push_frame(frame)),
            Error::Panicked(failure) => Error::Panicked(failure.push_frame(frame)),
            Error::Cancelled => Error::Cancelled,
            other => Error::Failed(
                Failure::new(other.to_string())
                    .with_cause(other)
                    .push_frame(frame),
            ),
        }
    }

    /// The error as first raised, before any task frame wrapped it.
    ///
    /// ```
    /// use enact::{Error, Runtime};
    ///
    /// let runtime = Runtime::new();
    /// let result: enact::Result<u8> =
    ///     runtime.block_on(|cx| async move { cx.resource(|_, _| async { Ok(()) }).await });
    /// let err = result.unwrap_err();
    /// assert!(matches!(err, Error::Failed(_)));
    /// assert!(matches!(err.origin(), Error::ResourceNotProvided { .. }));
    /// ```
    pub fn origin(&self) -> &Error {
        match self.failure().and_then(|failure| failure.cause.as_deref()) {
            Some(cause) => cause.origin(),
            None => self,
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Failed(failure)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::msg(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

/// A failure message plus the task frames it unwound through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    message: String,
    frames: Vec<String>,
    cause: Option<Box<Error>>,
}

impl Failure {
    /// Create a failure with no frames recorded yet.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            frames: Vec::new(),
            cause: None,
        }
    }

    /// The human-readable message, without the trace.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Frames from the innermost task outwards.
    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    /// A stack-style rendering of [`Failure::frames`], one `at` line per frame.
    pub fn trace(&self) -> String {
        self.frames
            .iter()
            .map(|frame| format!("    at {frame}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn with_cause(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    fn push_frame(mut self, frame: impl Into<String>) -> Self {
        self.frames.push(frame.into());
        self
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traced_failure_accumulates_frames() {
        let err = Error::msg("boom").traced("child").traced("root");
        let failure = err.failure().expect("failure");
        assert_eq!(failure.message(), "boom");
        assert_eq!(failure.frames(), ["child", "root"]);
        assert_eq!(failure.trace(), "    at child\n    at root");
    }

    #[test]
    fn cancellation_is_not_traced() {
        let err = Error::Cancelled.traced("task");
        assert!(err.is_cancelled());
        assert!(err.failure().is_none());
    }

    #[test]
    fn context_missing_becomes_failure_when_traced() {
        let err = Error::ContextMissing { name: "enact.render" }.traced("root");
        assert_eq!(
            err.failure().map(Failure::message),
            Some("context missing: enact.render")
        );
        assert_eq!(
            err.origin(),
            &Error::ContextMissing { name: "enact.render" }
        );
    }

    #[test]
    fn origin_survives_many_frames() {
        let err = Error::Stalled.traced("inner").traced("outer");
        assert_eq!(err.failure().unwrap().frames(), ["inner", "outer"]);
        assert_eq!(err.origin(), &Error::Stalled);
        assert_eq!(Error::msg("plain").origin(), &Error::msg("plain"));
    }

    #[test]
    fn from_std_keeps_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::from_std(&io);
        assert_eq!(err.to_string(), "disk gone");
    }
}
