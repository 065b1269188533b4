//! Picks the agent best suited to a goal.

use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::error::{Error, Result};
use goalclaw_memory::RetrievalRanker;
use std::sync::Arc;
use tracing::info;

use crate::profile::AgentProfile;

/// Ranks agent profiles by how close their expertise is to a goal.
pub struct AgentSelector {
    ranker: RetrievalRanker<AgentProfile>,
}

impl AgentSelector {
    pub fn new(embeddings: Arc<dyn EmbeddingApi>, profiles: Vec<AgentProfile>) -> Result<Self> {
        if profiles.is_empty() {
            return Err(Error::Config {
                message: "no agents to choose from".into(),
            });
        }
        let ranker = RetrievalRanker::new(embeddings, profiles, AgentProfile::selector_text)
            .unique(true)
            .limit(1);
        Ok(Self { ranker })
    }

    pub fn profiles(&self) -> &[AgentProfile] {
        self.ranker.items()
    }

    pub async fn select(&self, goal: &str) -> Result<&AgentProfile> {
        let ranked = self.ranker.query(goal).await?;
        let best = ranked
            .into_iter()
            .next()
            .ok_or_else(|| Error::Internal("agent ranking returned nothing".into()))?;
        info!(agent = %best.item.name, score = best.score, "Selected agent");
        Ok(best.item)
    }
}
