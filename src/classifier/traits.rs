//! Classifier transport trait and errors

use super::types::{ChatReply, ChatRequest};
use async_trait::async_trait;
use thiserror::Error;

/// Errors from classifier operations.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// Connection, timeout or other failure before a response arrived
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body was not a chat completion
    #[error("response parse error: {0}")]
    Parse(String),

    /// The reply had no usable structured result for `tool`
    #[error("schema violation from {tool}: {reason}")]
    SchemaViolation { tool: String, reason: String },

    /// Every attempt failed; carries the last failure
    #[error("{tool} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        tool: String,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid classifier configuration: {0}")]
    Config(String),
}

impl ClassifierError {
    /// Worth retrying: network failures, rate limits and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Network(_) => true,
            ClassifierError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Failure to talk to the endpoint, as opposed to a bad reply.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClassifierError::Network(_) | ClassifierError::Api { .. } | ClassifierError::Config(_)
        )
    }
}

/// One chat-completion round trip with tool definitions.
///
/// Abstracts over transport (HTTP, mock) so the client logic does not
/// depend on how the model is reached.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ClassifierError>;
}
