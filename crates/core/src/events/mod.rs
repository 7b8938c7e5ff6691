//! Live events module.
//!
//! Provides the live event vocabulary, the coalescing buffer used to batch
//! publication updates, and the traits for emitting and broadcasting events.
//! Runtime adapters (the web server) implement the traits to push events to
//! connected clients.

mod broadcaster;
mod buffer;
mod live_event;
mod sink;

pub use broadcaster::*;
pub use buffer::*;
pub use live_event::*;
pub use sink::*;
