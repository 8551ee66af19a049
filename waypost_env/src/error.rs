//! Error types for the Waypost environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The receiving half of an event stream has been dropped
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(what: impl Into<String>) -> Self {
        Self::ChannelClosed(what.into())
    }
}
