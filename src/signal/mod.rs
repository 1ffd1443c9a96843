//! Reactive cells and computed streams.
//!
//! A [`Value`] is a cell that can be read synchronously and followed as a
//! stream of changes. A [`Computed`] stream takes its values from a producer
//! task started per subscription.

mod computed;
mod value;

pub use computed::{compute, Computed, Emitter};
pub use value::{use_value, Value};
