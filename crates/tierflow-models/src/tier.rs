//! Cost tiers and the model catalog that binds them to concrete models.

use serde::{Deserialize, Serialize};

/// Planner-assigned difficulty label for a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Cost/capability band of the model fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    Verify,
    Deep,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Verify => "verify",
            Self::Deep => "deep",
        }
    }

    /// Escalation ladder used by the dynamic executor, cheapest first.
    pub const LADDER: [Tier; 3] = [Tier::Fast, Tier::Verify, Tier::Deep];
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tier's binding: model id, default output cap, and USD pricing per
/// 1M tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSpec {
    pub model: String,
    pub max_tokens: u32,
    pub input_price_per_1m: f64,
    pub output_price_per_1m: f64,
}

/// Catalog mapping every tier to its model binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierCatalog {
    pub fast: TierSpec,
    pub verify: TierSpec,
    pub deep: TierSpec,
}

impl Default for TierCatalog {
    fn default() -> Self {
        Self {
            fast: TierSpec {
                model: "gemini-2.5-flash-lite".to_string(),
                max_tokens: 1024,
                input_price_per_1m: 0.10,
                output_price_per_1m: 0.40,
            },
            verify: TierSpec {
                model: "gemini-2.5-flash".to_string(),
                max_tokens: 2048,
                input_price_per_1m: 0.15,
                output_price_per_1m: 0.60,
            },
            deep: TierSpec {
                model: "gemini-2.5-pro".to_string(),
                max_tokens: 4096,
                input_price_per_1m: 1.25,
                output_price_per_1m: 10.00,
            },
        }
    }
}

impl TierCatalog {
    pub fn spec(&self, tier: Tier) -> &TierSpec {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Verify => &self.verify,
            Tier::Deep => &self.deep,
        }
    }

    /// Default complexity → tier routing.
    pub fn tier_for(complexity: Complexity) -> Tier {
        match complexity {
            Complexity::Low => Tier::Fast,
            Complexity::Medium => Tier::Verify,
            Complexity::High => Tier::Deep,
        }
    }

    pub fn model(&self, tier: Tier) -> &str {
        &self.spec(tier).model
    }

    pub fn max_tokens(&self, tier: Tier) -> u32 {
        self.spec(tier).max_tokens
    }

    /// Cost of `tokens` output tokens at `tier` pricing.
    pub fn output_cost(&self, tier: Tier, tokens: u32) -> f64 {
        tokens as f64 * self.spec(tier).output_price_per_1m / 1_000_000.0
    }

    /// Actual cost of one call from observed token counts.
    pub fn call_cost(&self, tier: Tier, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let spec = self.spec(tier);
        prompt_tokens as f64 * spec.input_price_per_1m / 1_000_000.0
            + completion_tokens as f64 * spec.output_price_per_1m / 1_000_000.0
    }

    /// Worst-case cost of one call at `tier`: the full output cap billed
    /// at output pricing. Input cost is excluded on purpose — the cap is
    /// the lever the allocator controls.
    pub fn worst_case_cost(&self, tier: Tier) -> f64 {
        self.output_cost(tier, self.spec(tier).max_tokens)
    }
}
