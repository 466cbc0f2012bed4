//! Data Assistant - answers one business question at a time
//!
//! The enriched table is built once when the assistant is created and shared
//! read-only across questions. Each question then runs:
//! 1. Intent classification (must resolve to an analysis to continue)
//! 2. The matching aggregation
//! 3. Narration of a bounded preview of the result

use crate::analysis::{self, AnalysisResult, ResultPreview};
use crate::config::AnalystConfig;
use crate::enrich::{enrich, EnrichedTable};
use crate::error::Result;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::CompletionClient;
use crate::narrative::NarrativeGenerator;
use crate::tables::CanonicalTables;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const EXAMPLE_QUESTIONS: [&str; 10] = [
    "Which product categories generate high revenue with relatively low marketing spend?",
    "How do discounts impact revenue differently across product categories?",
    "Which products perform well in California but underperform in New York?",
    "Are there categories where offline marketing is more effective than online?",
    "Which products depend heavily on discounts to drive volume?",
    "How does marketing spend correlate with sales for Nest and Google products?",
    "Which categories have high sales volume but low overall revenue?",
    "Where should marketing budgets be reallocated for better ROI?",
    "Which products are consistently underperforming despite promotions?",
    "Based on all data, what should be the top business focus areas?",
];

/// Response from the data assistant
#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponse {
    pub query_id: Uuid,
    pub question: String,
    pub intent: Intent,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Classified as `unknown`; nothing was analysed.
    NotUnderstood,
    /// `preview` is exactly what the narrator was shown.
    Analysed {
        result: AnalysisResult,
        preview: ResultPreview,
        explanation: Explanation,
    },
}

/// Narrative outcome. A failed narration still ships the analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Explanation {
    Generated(String),
    Unavailable(String),
}

impl AssistantResponse {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.outcome {
            Outcome::Analysed { result, .. } => Some(result),
            Outcome::NotUnderstood => None,
        }
    }

    pub fn preview(&self) -> Option<&ResultPreview> {
        match &self.outcome {
            Outcome::Analysed { preview, .. } => Some(preview),
            Outcome::NotUnderstood => None,
        }
    }

    pub fn explanation(&self) -> Option<&Explanation> {
        match &self.outcome {
            Outcome::Analysed { explanation, .. } => Some(explanation),
            Outcome::NotUnderstood => None,
        }
    }
}

pub struct DataAssistant {
    table: Arc<EnrichedTable>,
    classifier: IntentClassifier,
    narrator: NarrativeGenerator,
    preview_rows: usize,
}

impl DataAssistant {
    /// Enrich `tables` and wire the model client into classifier and narrator.
    pub fn new(
        tables: &CanonicalTables,
        client: Arc<dyn CompletionClient>,
        config: &AnalystConfig,
    ) -> Result<Self> {
        let table = Arc::new(enrich(tables)?);
        Ok(Self::with_table(table, client, config))
    }

    /// Build around an already-enriched table.
    pub fn with_table(
        table: Arc<EnrichedTable>,
        client: Arc<dyn CompletionClient>,
        config: &AnalystConfig,
    ) -> Self {
        let policy = config.call_policy();
        Self {
            table,
            classifier: IntentClassifier::new(
                client.clone(),
                config.model.clone(),
                config.classifier_temperature,
                policy,
            ),
            narrator: NarrativeGenerator::new(
                client,
                config.model.clone(),
                config.narrative_temperature,
                policy,
            ),
            preview_rows: config.preview_rows,
        }
    }

    pub fn table(&self) -> &Arc<EnrichedTable> {
        &self.table
    }

    /// Answer one question.
    ///
    /// Errors only when classification is unavailable or the result cannot be
    /// rendered; narration failures are reported inside the response.
    pub async fn answer(&self, question: &str) -> Result<AssistantResponse> {
        let query_id = Uuid::new_v4();
        let span = info_span!("answer", %query_id);
        self.answer_in_span(query_id, question).instrument(span).await
    }

    async fn answer_in_span(&self, query_id: Uuid, question: &str) -> Result<AssistantResponse> {
        info!("Question: {}", question);
        let intent = self.classifier.classify(question).await?;

        let Some(selected) = intent.analysis() else {
            info!("Question not understood");
            return Ok(AssistantResponse {
                query_id,
                question: question.to_string(),
                intent,
                outcome: Outcome::NotUnderstood,
            });
        };

        let result = analysis::run(selected, &self.table);
        info!("Ran {} over {} rows -> {} result rows", selected, self.table.len(), result.len());

        let preview = result.preview(self.preview_rows)?;
        let explanation = match self.narrator.explain(question, &preview).await {
            Ok(text) => Explanation::Generated(text),
            Err(e) => {
                warn!("Returning analysis without narrative: {}", e);
                Explanation::Unavailable(e.to_string())
            }
        };

        Ok(AssistantResponse {
            query_id,
            question: question.to_string(),
            intent,
            outcome: Outcome::Analysed {
                result,
                preview,
                explanation,
            },
        })
    }
}
