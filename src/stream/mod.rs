//! Multicast streams and the cursor protocol used to consume them.

mod channel;

pub use channel::{Channel, Cursor, Source};
