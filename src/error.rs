// Engine error types and the value-typed error events delivered to subscribers

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FeedState;

/// Errors returned by the feed and its components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// Invalid option value; `start` fails before any state change.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// Sample source unreachable or timed out.
    #[error("sample source unavailable: {message}")]
    SourceUnavailable { message: String },

    /// Raw values out of range; the sample is dropped.
    #[error("invalid sample: {message}")]
    InvalidSample { message: String },

    #[error("feed is {state}; operation requires it to be stopped")]
    InvalidState { state: FeedState },
}

impl FeedError {
    pub fn config(message: impl Into<String>) -> Self {
        FeedError::Config {
            message: message.into(),
        }
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        FeedError::SourceUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_sample(message: impl Into<String>) -> Self {
        FeedError::InvalidSample {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::Config { .. } | FeedError::InvalidState { .. } => ErrorKind::Config,
            FeedError::SourceUnavailable { .. } => ErrorKind::SourceUnavailable,
            FeedError::InvalidSample { .. } => ErrorKind::InvalidSample,
        }
    }

    /// Converts into the event form published on the subscription stream.
    pub fn to_event(&self, timestamp: u64) -> ErrorEvent {
        ErrorEvent {
            kind: self.kind(),
            message: self.to_string(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Config,
    SourceUnavailable,
    InvalidSample,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: u64,
}
