//! Application-level errors.
//!
//! Guard and transition rejections never become a [`DeskError`]; the router turns them into
//! replies. What remains are store and platform failures, which end the in-flight event with
//! [`GENERIC_FAILURE`].

use thiserror::Error;
use ticketdesk_runtime::RuntimeError;
use ticketdesk_runtime::ports::{PlatformError, TranscriptError};
use ticketdesk_runtime::store::StoreError;

use crate::config::ConfigError;

/// Reply sent when an event fails for reasons the actor cannot fix.
pub const GENERIC_FAILURE: &str = "There was an error while executing this command!";

/// Failures that abort one inbound event or the application start.
#[derive(Error, Debug)]
pub enum DeskError {
    /// The runtime failed after the engine accepted the transition.
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The store could not be read or written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The chat platform refused or failed a call.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// A manual transcript could not be captured.
    #[error("Transcript error: {0}")]
    Transcript(#[from] TranscriptError),

    /// The configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The application was built without a required port.
    #[error("No {0} configured")]
    MissingPort(&'static str),
}
