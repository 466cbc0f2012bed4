//! Session configuration: defaults, optional JSON file, then environment.

use crate::error::{AnalystError, Result};
use crate::llm::CallPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub data_dir: PathBuf,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub classifier_temperature: f32,
    pub narrative_temperature: f32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Leading result rows sent to the narrative prompt.
    pub preview_rows: usize,
    /// Leading result rows shown to the user.
    pub display_rows: usize,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            classifier_temperature: 0.0,
            narrative_temperature: 0.3,
            request_timeout_secs: 30,
            max_retries: 1,
            retry_backoff_ms: 500,
            preview_rows: 5,
            display_rows: 20,
        }
    }
}

impl AnalystConfig {
    /// Defaults, overlaid by `path` (if given), overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = var("ANALYST_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = var("ANALYST_LLM_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = var("ANALYST_LLM_MODEL") {
            self.model = model;
        }
        if let Some(key) = var("GROQ_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(secs) = var("ANALYST_LLM_TIMEOUT_SECS") {
            self.request_timeout_secs = secs.trim().parse().map_err(|_| {
                AnalystError::Config(format!("ANALYST_LLM_TIMEOUT_SECS is not a number: '{}'", secs))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("classifier_temperature", self.classifier_temperature),
            ("narrative_temperature", self.narrative_temperature),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalystError::Config(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(AnalystError::Config("request_timeout_secs must be > 0".to_string()));
        }
        if self.preview_rows == 0 {
            return Err(AnalystError::Config("preview_rows must be > 0".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(AnalystError::Config("model must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: self.request_timeout(),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_hosted_model() {
        let config = AnalystConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.classifier_temperature, 0.0);
        assert!(config.narrative_temperature > config.classifier_temperature);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_remaining_defaults() {
        let config: AnalystConfig =
            serde_json::from_str(r#"{"model": "llama-3.3-70b-versatile", "preview_rows": 3}"#).unwrap();
        assert_eq!(config.model, "llama-3.3-70b-versatile");
        assert_eq!(config.preview_rows, 3);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("GROQ_API_KEY", "gsk_test"),
            ("ANALYST_LLM_MODEL", "other-model"),
            ("ANALYST_LLM_TIMEOUT_SECS", "7"),
        ]
        .into_iter()
        .collect();
        let mut config = AnalystConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.model, "other-model");
        assert_eq!(config.call_policy().timeout, Duration::from_secs(7));
    }

    #[test]
    fn bad_timeout_in_environment_is_rejected() {
        let mut config = AnalystConfig::default();
        let result = config.apply_env(|k| (k == "ANALYST_LLM_TIMEOUT_SECS").then(|| "soon".to_string()));
        assert!(matches!(result, Err(AnalystError::Config(_))));
    }

    #[test]
    fn negative_temperature_is_invalid() {
        let config = AnalystConfig {
            narrative_temperature: -0.1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AnalystError::Config(_))));
    }

    #[test]
    fn api_key_is_never_serialised() {
        let config = AnalystConfig {
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
