//! Blog Core - live update primitives.
//!
//! This crate holds the pieces of the blog backend that do not depend on a
//! transport: the coalescing event buffer, the broadcaster contract, and the
//! live event vocabulary emitted by request handlers. The web server crate
//! provides the runtime adapters.

pub mod errors;
pub mod events;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
