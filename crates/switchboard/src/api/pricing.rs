//! Approximate per-model pricing for the USD estimate reported with each turn.
//!
//! The estimate multiplies the conversation's accounted token counters by a
//! per-model rate. It exists to spot runaway conversations, not for billing.

/// USD per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::new(3.0, 15.0)
    }
}

// Ordered: more specific needles first.
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing::new(15.0, 75.0)),
    ("sonnet", ModelPricing::new(3.0, 15.0)),
    ("haiku", ModelPricing::new(0.25, 1.25)),
    ("4o-mini", ModelPricing::new(0.15, 0.60)),
    ("gpt-4", ModelPricing::new(2.50, 10.0)),
    ("flash", ModelPricing::new(0.075, 0.30)),
    ("gemini", ModelPricing::new(1.25, 5.0)),
    ("deepseek", ModelPricing::new(0.27, 1.10)),
];

/// Look up pricing by the model name segment after the last `/`, so org
/// prefixes like `my-org/` never match a needle by accident.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();
    PRICING_TABLE
        .iter()
        .find(|(needle, _)| name.contains(needle))
        .map(|(_, pricing)| *pricing)
        .unwrap_or_default()
}
