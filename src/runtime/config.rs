use std::time::Duration;

/// Tunables for a [`Runtime`](super::Runtime).
///
/// ```
/// use enact::runtime::RuntimeConfig;
/// use std::time::Duration;
///
/// let config = RuntimeConfig::default()
///     .with_name("ui")
///     .with_stall_timeout(Duration::from_millis(50));
/// assert_eq!(config.name(), "ui");
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    name: String,
    catch_panics: bool,
    max_polls_per_tick: Option<usize>,
    stall_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "enact".to_string(),
            catch_panics: true,
            max_polls_per_tick: None,
            stall_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Name used for the root of trace frames and tracing spans.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Turn panics inside task bodies into [`Error::Panicked`](crate::Error::Panicked)
    /// failures instead of unwinding through the host.
    pub fn with_catch_panics(mut self, catch: bool) -> Self {
        self.catch_panics = catch;
        self
    }

    /// Upper bound on task polls performed by one `run_until_stalled` call.
    pub fn with_max_polls_per_tick(mut self, limit: usize) -> Self {
        self.max_polls_per_tick = Some(limit);
        self
    }

    /// How long `block_on` parks with nothing runnable before giving up.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Name of the runtime, `"enact"` unless set.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether panics in bodies and finalizers are caught. On by default.
    pub fn catch_panics(&self) -> bool {
        self.catch_panics
    }

    /// Poll limit per `run_until_stalled`, unbounded when `None`.
    pub fn max_polls_per_tick(&self) -> Option<usize> {
        self.max_polls_per_tick
    }

    /// How long `block_on` may park, forever when `None`.
    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout
    }
}
