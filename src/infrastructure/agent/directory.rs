//! Agent profiles loaded from configuration

use crate::config::AgentConfig;
use crate::domain::agent::{AgentDirectory, AgentProfile};
use crate::domain::shared::AgentId;
use std::collections::HashMap;
use tracing::info;

pub struct StaticAgentDirectory {
    agents: HashMap<AgentId, AgentProfile>,
}

impl StaticAgentDirectory {
    pub fn new(profiles: impl IntoIterator<Item = AgentProfile>) -> Self {
        Self {
            agents: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    /// Agents without a voice fall back to `default_voice_id`
    pub fn from_config(agents: &[AgentConfig], default_voice_id: &str) -> Self {
        let directory = Self::new(agents.iter().map(|agent| AgentProfile {
            id: AgentId::new(agent.id.clone()),
            name: agent.name.clone(),
            voice_id: agent
                .voice_id
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default_voice_id.to_string()),
            greeting: agent.greeting.clone().filter(|g| !g.trim().is_empty()),
            instructions: agent.instructions.clone(),
        }));
        info!("Loaded {} agent profiles", directory.len());
        directory
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[async_trait::async_trait]
impl AgentDirectory for StaticAgentDirectory {
    async fn resolve(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        self.agents.get(agent_id).cloned()
    }
}
