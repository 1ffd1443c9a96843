//! # Enact
//!
//! A structured-concurrency runtime for reactive values that drive rendered
//! output.
//!
//! Enact is built from three layers:
//!
//! ## Runtime (Tasks and scopes)
//!
//! A single-threaded cooperative executor where every task is owned:
//! - `Scope` - Ownership and cancellation boundary for a tree of tasks
//! - `Cx` - The explicit environment every task body receives
//! - `Task<T>` - Handle to a spawned task
//! - Resources whose release logic runs exactly once, however the owner ends
//!
//! ## Streams and signals
//!
//! - `Channel<T>` - Multicast stream with one cursor per consumer
//! - `Value<T>` - Reactive cell that replays its current value, then follows
//! - `Computed<T>` - Stream fed by a producer task per subscription
//!
//! ## Render bridge
//!
//! - `Component` - Async body that renders through its context
//! - `Mount` - Host-side handle; crashes become diagnostic content
//!
//! ```
//! use enact::{use_value, Component, Runtime};
//!
//! let count = use_value(0);
//! let view: Component<(), String> = count.component();
//!
//! let runtime = Runtime::new();
//! let mount = view.mount(&runtime, ());
//! runtime.run_until_stalled();
//! assert_eq!(mount.content().as_deref(), Some("0"));
//!
//! count.set(5);
//! runtime.run_until_stalled();
//! assert_eq!(mount.content().as_deref(), Some("5"));
//! ```

pub mod error;
pub mod render;
pub mod runtime;
pub mod signal;
pub mod stream;

// Re-export main types for convenience
pub use error::{Error, Failure, Result};
pub use render::{render, ChangeGuard, Component, Content, Crash, Mount};
pub use runtime::{Context, Cx, Runtime, RuntimeConfig, Scope, Task};
pub use signal::{compute, use_value, Computed, Emitter, Value};
pub use stream::{Channel, Cursor, Source};
