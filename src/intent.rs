//! Intent classification - maps a free-text question onto the closed intent set.

use crate::analysis::Analysis;
use crate::error::{AnalystError, Result};
use crate::llm::{complete_with_policy, CallPolicy, CompletionClient, CompletionRequest};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SalesTrend,
    UnderperformingProducts,
    DiscountVsRevenue,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::SalesTrend,
        Intent::UnderperformingProducts,
        Intent::DiscountVsRevenue,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SalesTrend => "sales_trend",
            Intent::UnderperformingProducts => "underperforming_products",
            Intent::DiscountVsRevenue => "discount_vs_revenue",
            Intent::Unknown => "unknown",
        }
    }

    /// Exact label match only.
    pub fn from_label(label: &str) -> Option<Self> {
        Intent::ALL.into_iter().find(|intent| intent.as_str() == label)
    }

    /// The analysis this intent dispatches to; `None` for `Unknown`.
    pub fn analysis(self) -> Option<Analysis> {
        match self {
            Intent::SalesTrend => Some(Analysis::SalesTrend),
            Intent::UnderperformingProducts => Some(Analysis::UnderperformingProducts),
            Intent::DiscountVsRevenue => Some(Analysis::DiscountVsRevenue),
            Intent::Unknown => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trim and lower-case a raw model reply; anything that is not exactly one
/// of the enumerated labels becomes `Unknown`.
pub fn normalize_label(raw: &str) -> Intent {
    let normalized = raw.trim().to_lowercase();
    match Intent::from_label(&normalized) {
        Some(intent) => intent,
        None => {
            warn!("Classifier returned out-of-vocabulary label {:?}; using unknown", raw);
            Intent::Unknown
        }
    }
}

pub fn classification_prompt(question: &str) -> String {
    let labels = Intent::ALL.iter().map(|i| format!("- {}", i)).join("\n");
    format!(
        r#"Classify into ONE intent:
{}

Return ONLY the intent name.
Question: {}"#,
        labels, question
    )
}

pub struct IntentClassifier {
    client: Arc<dyn CompletionClient>,
    model: String,
    temperature: f32,
    policy: CallPolicy,
}

impl IntentClassifier {
    pub fn new(client: Arc<dyn CompletionClient>, model: String, temperature: f32, policy: CallPolicy) -> Self {
        Self {
            client,
            model,
            temperature,
            policy,
        }
    }

    pub async fn classify(&self, question: &str) -> Result<Intent> {
        if question.trim().is_empty() {
            return Ok(Intent::Unknown);
        }

        let prompt = classification_prompt(question);
        debug!("Classification prompt:\n{}", prompt);
        let request = CompletionRequest::user_prompt(&self.model, prompt, self.temperature);

        let raw = complete_with_policy(self.client.as_ref(), &request, &self.policy)
            .await
            .map_err(|e| AnalystError::ClassificationUnavailable(e.to_string()))?;

        let intent = normalize_label(&raw);
        info!("Classified question as {}", intent);
        Ok(intent)
    }
}
