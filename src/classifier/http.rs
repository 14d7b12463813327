//! OpenAI-compatible chat-completions transport

use super::traits::{Classifier, ClassifierError};
use super::types::{ChatMessage, ChatReply, ChatRequest, ToolCall, ToolDefinition};
use crate::config::ClassifierConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct HttpClassifier {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Config(e.to_string()))?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        if config.endpoint.trim().is_empty() {
            return Err(ClassifierError::Config("classifier endpoint is not set".to_string()));
        }
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[derive(Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    /// Usually a JSON string; some servers send the object itself
    #[serde(default)]
    arguments: Value,
}

fn request_body(request: &ChatRequest) -> RequestBody<'_> {
    RequestBody {
        model: &request.model,
        messages: &request.messages,
        tools: request
            .tools
            .iter()
            .map(|function| FunctionTool {
                kind: "function",
                function,
            })
            .collect(),
        tool_choice: request.tool_choice.as_ref().map(|name| {
            serde_json::json!({ "type": "function", "function": { "name": name } })
        }),
        temperature: 0.0,
    }
}

fn into_reply(body: ResponseBody) -> Result<ChatReply, ClassifierError> {
    let message = body
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| ClassifierError::Parse("response has no choices".to_string()))?;
    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            name: call.function.name,
            arguments: match call.function.arguments {
                Value::String(s) => s,
                other => other.to_string(),
            },
        })
        .collect();
    Ok(ChatReply {
        content: message.content,
        tool_calls,
    })
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ClassifierError> {
        let mut builder = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request_body(request));
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ResponseBody = response
            .json()
            .await
            .map_err(|e| ClassifierError::Parse(e.to_string()))?;
        debug!(model = %request.model, choices = body.choices.len(), "chat completion received");
        into_reply(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_forces_the_named_function() {
        let request = ChatRequest {
            model: "Qwen".into(),
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("hi")],
            tools: vec![ToolDefinition {
                name: "handleChoice".into(),
                description: "d".into(),
                parameters: json!({"type": "object"}),
            }],
            tool_choice: Some("handleChoice".into()),
        };
        let body = serde_json::to_value(request_body(&request)).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "handleChoice");
        assert_eq!(body["tool_choice"]["function"]["name"], "handleChoice");
    }

    #[test]
    fn reply_accepts_string_or_object_arguments() {
        let body: ResponseBody = serde_json::from_value(json!({
            "choices": [{"message": {"content": null, "tool_calls": [
                {"id": "1", "type": "function", "function": {"name": "a", "arguments": "{\"x\":1}"}},
                {"id": "2", "type": "function", "function": {"name": "b", "arguments": {"y": 2}}}
            ]}}]
        }))
        .unwrap();
        let reply = into_reply(body).unwrap();
        assert_eq!(reply.tool_calls[0].arguments, r#"{"x":1}"#);
        assert_eq!(reply.tool_calls[1].arguments, r#"{"y":2}"#);
        assert!(reply.content.is_none());
    }

    #[test]
    fn empty_choices_is_a_parse_error() {
        let body: ResponseBody = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(matches!(into_reply(body), Err(ClassifierError::Parse(_))));
    }

    #[test]
    fn from_config_requires_an_endpoint() {
        let config = ClassifierConfig::default();
        assert!(matches!(
            HttpClassifier::from_config(&config),
            Err(ClassifierError::Config(_))
        ));
    }
}
