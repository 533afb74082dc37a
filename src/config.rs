use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const DEFAULT_BLANK_PAGE_MAX_BYTES: u64 = 1024;
pub const DEFAULT_PROCESSED_SUFFIX: &str = ".processed";

/// One keyword rule: any keyword found in a source filename selects `group_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub name: String,
    pub keywords: Vec<String>,
    pub group_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Evaluated in order; the first matching rule wins.
    pub rules: Vec<ClassificationRule>,
    pub blank_page_max_bytes: u64,
    pub processed_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rules: vec![ClassificationRule {
                name: "two_page_reports".to_string(),
                keywords: vec![
                    "Math2".to_string(),
                    "Arts_Chorus".to_string(),
                    "WL_French".to_string(),
                ],
                group_size: 2,
            }],
            blank_page_max_bytes: DEFAULT_BLANK_PAGE_MAX_BYTES,
            processed_suffix: DEFAULT_PROCESSED_SUFFIX.to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid pipeline config {}", path.display()))?;

        info!(
            path = %path.display(),
            rules = config.rules.len(),
            "loaded pipeline config"
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.group_size == 0 {
                bail!("rule '{}' has group_size 0", rule.name);
            }
            if rule.keywords.iter().all(|keyword| keyword.is_empty()) {
                bail!("rule '{}' has no keywords", rule.name);
            }
        }
        if !self.processed_suffix.starts_with('.') || self.processed_suffix.len() < 2 {
            bail!(
                "processed_suffix must start with '.' and be non-empty: '{}'",
                self.processed_suffix
            );
        }
        if self.processed_suffix.eq_ignore_ascii_case(".pdf") {
            bail!("processed_suffix cannot be '.pdf'");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let raw = r#"{ "blank_page_max_bytes": 2048 }"#;
        let config: PipelineConfig = serde_json::from_str(raw).expect("config should parse");

        assert_eq!(config.blank_page_max_bytes, 2048);
        assert_eq!(config.processed_suffix, DEFAULT_PROCESSED_SUFFIX);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].group_size, 2);
    }

    #[test]
    fn validate_rejects_zero_group_size() {
        let config = PipelineConfig {
            rules: vec![ClassificationRule {
                name: "broken".to_string(),
                keywords: vec!["Habits".to_string()],
                group_size: 0,
            }],
            ..PipelineConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn load_without_path_uses_defaults() {
        let config = PipelineConfig::load(None).expect("defaults should load");
        assert_eq!(config.blank_page_max_bytes, DEFAULT_BLANK_PAGE_MAX_BYTES);
    }
}
