//! Scripted classifier for tests
//!
//! Replies are queued per tool, optionally narrowed to prompts containing a
//! substring. The last reply of a queue repeats once the queue runs dry.

use super::traits::{Classifier, ClassifierError};
use super::types::{ChatReply, ChatRequest, Role};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum MockReply {
    /// A call to the requested tool with these arguments
    Tool(Value),
    /// Plain text instead of a tool call
    Text(String),
    /// A network failure
    Transport(String),
    /// An HTTP error status
    Status(u16),
}

struct Rule {
    tool: String,
    prompt_contains: Option<String>,
    replies: VecDeque<MockReply>,
    last: Option<MockReply>,
}

impl Rule {
    fn next(&mut self) -> Option<MockReply> {
        if let Some(reply) = self.replies.pop_front() {
            self.last = Some(reply.clone());
            return Some(reply);
        }
        self.last.clone()
    }
}

#[derive(Default)]
pub struct MockClassifier {
    rules: Mutex<Vec<Rule>>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for any prompt sent to `tool`.
    pub fn with_reply(self, tool: &str, reply: MockReply) -> Self {
        self.push(tool, None, reply);
        self
    }

    /// Queue a reply for prompts to `tool` that contain `fragment`.
    ///
    /// Narrowed rules take precedence over catch-all rules.
    pub fn with_reply_for(self, tool: &str, fragment: &str, reply: MockReply) -> Self {
        self.push(tool, Some(fragment), reply);
        self
    }

    fn push(&self, tool: &str, fragment: Option<&str>, reply: MockReply) {
        let mut rules = self.rules.lock().unwrap();
        let existing = rules
            .iter_mut()
            .find(|r| r.tool == tool && r.prompt_contains.as_deref() == fragment);
        match existing {
            Some(rule) => rule.replies.push_back(reply),
            None => rules.push(Rule {
                tool: tool.to_string(),
                prompt_contains: fragment.map(str::to_string),
                replies: VecDeque::from([reply]),
                last: None,
            }),
        }
    }

    /// Number of requests that forced `tool`.
    pub fn calls(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().get(tool).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ClassifierError> {
        self.requests.lock().unwrap().push(request.clone());
        let tool = request
            .tool_choice
            .clone()
            .or_else(|| request.tools.first().map(|t| t.name.clone()))
            .unwrap_or_default();
        *self.calls.lock().unwrap().entry(tool.clone()).or_insert(0) += 1;

        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("");

        let reply = {
            let mut rules = self.rules.lock().unwrap();
            let narrowed = rules.iter().position(|r| {
                r.tool == tool
                    && r.prompt_contains
                        .as_deref()
                        .map_or(false, |fragment| prompt.contains(fragment))
            });
            let index = narrowed.or_else(|| {
                rules
                    .iter()
                    .position(|r| r.tool == tool && r.prompt_contains.is_none())
            });
            index.and_then(|i| rules[i].next())
        };

        match reply {
            Some(MockReply::Tool(args)) => Ok(ChatReply::tool_call(tool, args.to_string())),
            Some(MockReply::Text(text)) => Ok(ChatReply::text(text)),
            Some(MockReply::Transport(message)) => Err(ClassifierError::Network(message)),
            Some(MockReply::Status(status)) => Err(ClassifierError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(ClassifierError::Config(format!("no scripted reply for {}", tool))),
        }
    }
}
