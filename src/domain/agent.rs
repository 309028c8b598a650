//! AI agents that speak on outbound calls

use crate::domain::call::TranscriptSegment;
use crate::domain::shared::{AgentId, Result};
use serde::{Deserialize, Serialize};

/// Persona and voice of an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    /// Voice used by the speech synthesis upstream
    pub voice_id: String,
    /// Spoken as soon as media is bridged
    pub greeting: Option<String>,
    /// System prompt for the conversation model
    pub instructions: String,
}

/// Lookup of agent profiles
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn resolve(&self, agent_id: &AgentId) -> Option<AgentProfile>;
}

/// Produces the agent's next line in a conversation
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ConversationAgent: Send + Sync {
    /// `history` is the transcript so far, `input` the caller's latest
    /// utterance (empty when it could not be transcribed). `None` means the
    /// agent stays silent this turn.
    async fn respond(
        &self,
        agent: &AgentProfile,
        history: &[TranscriptSegment],
        input: &str,
    ) -> Result<Option<String>>;
}
