//! Core error types for the live update pipeline.

use thiserror::Error;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the core crate.
///
/// Buffering itself never fails; errors only come from the delivery side
/// (a broadcaster refusing a batch) or from malformed live events handed in
/// by producers.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Invalid live event payload: {0}")]
    InvalidPayload(String),
}
