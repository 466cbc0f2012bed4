//! Narrative generation - asks the model to explain a result preview.

use crate::analysis::ResultPreview;
use crate::error::{AnalystError, Result};
use crate::llm::{complete_with_policy, CallPolicy, CompletionClient, CompletionRequest};
use std::sync::Arc;
use tracing::{debug, info};

pub fn explanation_prompt(question: &str, preview: &ResultPreview) -> String {
    format!(
        r#"You are a business analyst.

Question:
{}

Analysis output (sample, {} of {} rows):
{}

Explain:
1. What is happening
2. Why it might be happening
3. Business implication"#,
        question,
        preview.rows_shown(),
        preview.total_rows(),
        preview.table()
    )
}

pub struct NarrativeGenerator {
    client: Arc<dyn CompletionClient>,
    model: String,
    temperature: f32,
    policy: CallPolicy,
}

impl NarrativeGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, model: String, temperature: f32, policy: CallPolicy) -> Self {
        Self {
            client,
            model,
            temperature,
            policy,
        }
    }

    pub async fn explain(&self, question: &str, preview: &ResultPreview) -> Result<String> {
        let prompt = explanation_prompt(question, preview);
        debug!("Explanation prompt:\n{}", prompt);
        let request = CompletionRequest::user_prompt(&self.model, prompt, self.temperature);

        let text = complete_with_policy(self.client.as_ref(), &request, &self.policy)
            .await
            .map_err(|e| AnalystError::ExplanationUnavailable(e.to_string()))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AnalystError::ExplanationUnavailable(
                "model returned an empty explanation".to_string(),
            ));
        }
        info!("Generated {}-character explanation for {}", text.len(), preview.analysis());
        Ok(text.to_string())
    }
}
