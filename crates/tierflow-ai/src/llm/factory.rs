//! Per-tier client construction.

use std::sync::Arc;

use tierflow_models::{Tier, TierCatalog};

use crate::error::Result;
use crate::llm::{GeminiClient, LlmClient, RetryingLlmClient};

/// One client per execution tier, ready to hand to either executor.
#[derive(Clone)]
pub struct TierClients {
    fast: Arc<dyn LlmClient>,
    verify: Arc<dyn LlmClient>,
    deep: Arc<dyn LlmClient>,
}

impl TierClients {
    pub fn from_arcs(
        fast: Arc<dyn LlmClient>,
        verify: Arc<dyn LlmClient>,
        deep: Arc<dyn LlmClient>,
    ) -> Self {
        Self { fast, verify, deep }
    }

    pub fn get(&self, tier: Tier) -> &Arc<dyn LlmClient> {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Verify => &self.verify,
            Tier::Deep => &self.deep,
        }
    }
}

/// Build retry-wrapped Gemini clients for every tier in the catalog.
pub fn tier_clients(api_key: &str, catalog: &TierCatalog) -> Result<TierClients> {
    let build = |tier: Tier| -> Result<Arc<dyn LlmClient>> {
        let client = GeminiClient::new(api_key, catalog.model(tier))?;
        Ok(Arc::new(RetryingLlmClient::with_default_config(Arc::new(
            client,
        ))))
    };

    Ok(TierClients {
        fast: build(Tier::Fast)?,
        verify: build(Tier::Verify)?,
        deep: build(Tier::Deep)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_tier_lookup_matches_ladder() {
        let fast = Arc::new(MockLlmClient::new("fast-model"));
        let verify = Arc::new(MockLlmClient::new("verify-model"));
        let deep = Arc::new(MockLlmClient::new("deep-model"));
        let clients = TierClients::from_arcs(fast, verify, deep);

        assert_eq!(clients.get(Tier::Fast).model(), "fast-model");
        assert_eq!(clients.get(Tier::Verify).model(), "verify-model");
        assert_eq!(clients.get(Tier::Deep).model(), "deep-model");
    }
}
