//! Conversation agent backed by an OpenAI-compatible chat completions API

use crate::domain::agent::{AgentProfile, ConversationAgent};
use crate::domain::call::{Speaker, TranscriptSegment};
use crate::domain::shared::{CallError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct ChatCompletionAgent {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    max_history: usize,
    max_tokens: u32,
    request_timeout: Duration,
}

impl ChatCompletionAgent {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: &str,
        model: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        if api_key.is_empty() {
            warn!("Conversation agent created without API key; agents will only greet");
        }
        Self {
            client,
            api_key,
            endpoint: format!("{}/v1/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            max_history: 20,
            max_tokens: 150,
            request_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_limits(mut self, max_history: usize, max_tokens: u32, request_timeout: Duration) -> Self {
        self.max_history = max_history;
        self.max_tokens = max_tokens;
        self.request_timeout = request_timeout;
        self
    }

    fn build_messages(
        &self,
        agent: &AgentProfile,
        history: &[TranscriptSegment],
        input: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.max_history + 2);
        messages.push(ChatMessage {
            role: "system",
            content: format!(
                "You are {}, speaking on a phone call. Keep replies short and natural for speech.\n{}",
                agent.name, agent.instructions
            ),
        });

        let skip = history.len().saturating_sub(self.max_history);
        messages.extend(history.iter().skip(skip).filter(|s| !s.is_empty()).map(|segment| {
            ChatMessage {
                role: match segment.speaker {
                    Speaker::Caller => "user",
                    Speaker::Agent => "assistant",
                },
                content: segment.text.clone(),
            }
        }));

        // The caller's latest utterance is usually already the last history
        // entry; only add it when it is not.
        let already_included = history
            .last()
            .is_some_and(|s| s.speaker == Speaker::Caller && s.text == input);
        if !already_included {
            messages.push(ChatMessage {
                role: "user",
                content: input.to_string(),
            });
        }
        messages
    }
}

#[async_trait::async_trait]
impl ConversationAgent for ChatCompletionAgent {
    async fn respond(
        &self,
        agent: &AgentProfile,
        history: &[TranscriptSegment],
        input: &str,
    ) -> Result<Option<String>> {
        if input.trim().is_empty() || self.api_key.is_empty() {
            return Ok(None);
        }

        let request = ChatRequest {
            model: &self.model,
            messages: self.build_messages(agent, history, input),
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::Internal(format!("conversation model request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::Internal(format!(
                "conversation model returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Internal(format!("invalid conversation model reply: {}", e)))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        debug!("Agent {} reply: {:?}", agent.id, reply);
        Ok(reply)
    }
}
