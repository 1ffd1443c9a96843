//! Bridge between a task tree and a host display slot.
//!
//! A [`Component`] is an async body that calls [`render`] whenever it wants
//! to replace what the host shows. Mounting it allocates a scope, binds the
//! render callback into that scope's context, and starts the body. Crashes
//! anywhere in the tree become [`Content::crash`] output instead of reaching
//! the host.

mod bridge;

pub use bridge::{render, render_context, ChangeGuard, Component, Mount, Renderer};

use crate::error::{Error, Result};
use crate::runtime::Cx;
use crate::stream::Source;
use std::fmt;

/// Displayable output chosen by the host. The runtime never inspects it.
pub trait Content: Clone + 'static {
    /// Content showing plain text.
    fn text(text: String) -> Self;

    /// Diagnostic content shown in place of a crashed component.
    fn crash(crash: &Crash) -> Self;
}

impl Content for String {
    fn text(text: String) -> Self {
        text
    }

    fn crash(crash: &Crash) -> Self {
        format!("Component Crash\n{}\n{}", crash.message(), crash.trace())
    }
}

/// What the bridge knows about a failure that reached a mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crash {
    message: String,
    trace: String,
}

impl Crash {
    /// The error message, without the trace.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Stack-style trace, innermost task first. Never empty.
    pub fn trace(&self) -> &str {
        &self.trace
    }
}

impl From<&Error> for Crash {
    fn from(err: &Error) -> Self {
        let trace = err
            .failure()
            .map(|failure| failure.trace())
            .filter(|trace| !trace.is_empty())
            .unwrap_or_else(|| "    at <mount>".to_string());
        Self {
            message: err.to_string(),
            trace,
        }
    }
}

impl fmt::Display for Crash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.message, self.trace)
    }
}

/// Replace the current render position's content with the text of every
/// value `source` produces, until it ends.
pub(crate) async fn project_text<T, N, S>(cx: &Cx, source: &S) -> Result<()>
where
    T: Clone + fmt::Display,
    N: Content,
    S: Source<T> + ?Sized,
{
    let renderer = cx.expect(&render_context::<N>())?;
    let mut cursor = source.subscribe(cx).await?;
    while let Some(value) = cursor.current().await? {
        renderer.replace(N::text(value.to_string()));
        cursor.advance();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crash_from_failure_keeps_trace() {
        let err = Error::msg("boom").traced("root (#1)");
        let crash = Crash::from(&err);
        assert_eq!(crash.message(), "boom");
        assert_eq!(crash.trace(), "    at root (#1)");
        assert_eq!(
            String::crash(&crash),
            "Component Crash\nboom\n    at root (#1)"
        );
    }

    #[test]
    fn crash_without_frames_still_has_trace() {
        let crash = Crash::from(&Error::Stalled);
        assert!(!crash.trace().is_empty());
    }
}
