//! Classifier client
//!
//! Structured, schema-constrained calls to a chat model. The transport is a
//! trait so the pipeline can run against an HTTP endpoint or a scripted mock.

mod client;
mod http;
mod mock;
mod tool;
mod traits;
mod types;

pub use client::{ClassifierClient, RetryPolicy};
pub use http::HttpClassifier;
pub use mock::{MockClassifier, MockReply};
pub use tool::{parameters_schema, ToolOutput};
pub use traits::{Classifier, ClassifierError};
pub use types::{ChatMessage, ChatReply, ChatRequest, Conversation, Role, ToolCall, ToolDefinition};
