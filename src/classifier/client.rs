//! Structured-call client
//!
//! Sends system prompt + per-document history + the new prompt, forcing a
//! single tool. A reply without a decodable call to that tool is a schema
//! violation and the same request is sent again, up to `max_attempts` with
//! exponential backoff. Transient transport failures share that budget;
//! anything else returns immediately.

use super::tool::ToolOutput;
use super::traits::{Classifier, ClassifierError};
use super::types::{ChatMessage, ChatReply, ChatRequest, Conversation};
use crate::config::ClassifierConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.backoff_initial_ms),
            max_backoff: Duration::from_millis(config.backoff_max_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

pub struct ClassifierClient {
    transport: Arc<dyn Classifier>,
    model: String,
    system_prompt: String,
    retry: RetryPolicy,
}

impl ClassifierClient {
    pub fn new(
        transport: Arc<dyn Classifier>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            model: model.into(),
            system_prompt: system_prompt.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Make one structured call and extend `history` with the exchange.
    ///
    /// History is only extended on success, so a failed call leaves the
    /// document's conversation as it was.
    pub async fn call<T: ToolOutput>(
        &self,
        prompt: &str,
        mut history: Conversation,
    ) -> Result<(T, Conversation), ClassifierError> {
        let request = self.build_request::<T>(prompt, &history);
        let max_attempts = self.retry.max_attempts;
        let mut last_failure: Option<ClassifierError> = None;

        for attempt in 1..=max_attempts {
            let failure = match self.transport.complete(&request).await {
                Ok(reply) => match extract::<T>(&reply) {
                    Ok((output, arguments)) => {
                        debug!(tool = T::TOOL_NAME, attempt, "structured call succeeded");
                        history.push(ChatMessage::user(prompt));
                        history.push(ChatMessage::assistant(format!(
                            "Tool call made: {} called with parameters {}",
                            T::TOOL_NAME,
                            arguments
                        )));
                        return Ok((output, history));
                    }
                    Err(reason) => ClassifierError::SchemaViolation {
                        tool: T::TOOL_NAME.to_string(),
                        reason,
                    },
                },
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            warn!(
                tool = T::TOOL_NAME,
                attempt,
                max_attempts,
                error = %failure,
                "structured call attempt failed"
            );
            last_failure = Some(failure);
            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay(attempt)).await;
            }
        }

        match last_failure {
            Some(e) if e.is_transport() => Err(e),
            last => Err(ClassifierError::Exhausted {
                tool: T::TOOL_NAME.to_string(),
                attempts: max_attempts,
                last_error: last.map(|e| e.to_string()).unwrap_or_default(),
            }),
        }
    }

    fn build_request<T: ToolOutput>(&self, prompt: &str, history: &Conversation) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(history.messages().iter().cloned());
        messages.push(ChatMessage::user(prompt));
        ChatRequest {
            model: self.model.clone(),
            messages,
            tools: vec![T::tool()],
            tool_choice: Some(T::TOOL_NAME.to_string()),
        }
    }
}

/// Pull the forced tool's arguments out of a reply and decode them.
fn extract<T: ToolOutput>(reply: &ChatReply) -> Result<(T, String), String> {
    let call = reply
        .tool_calls
        .iter()
        .find(|c| c.name == T::TOOL_NAME)
        .ok_or_else(|| match (reply.tool_calls.first(), &reply.content) {
            (Some(other), _) => format!("called {} instead of {}", other.name, T::TOOL_NAME),
            (None, Some(text)) if !text.trim().is_empty() => {
                format!("plain text reply instead of a {} call", T::TOOL_NAME)
            }
            _ => "empty reply".to_string(),
        })?;
    let output = T::from_arguments(&call.arguments)?;
    Ok((output, call.arguments.clone()))
}
