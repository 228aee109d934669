use crate::error::{Error, Result};
use crate::vocabulary::VocabularyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store configuration, usually loaded from YAML.
///
/// ```yaml
/// path: /var/lib/odm/wells.duckdb
/// vocabulary:
///   policy: warn
///   variable_names: [casingStickup]
/// retry:
///   max_attempts: 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; in-memory when absent.
    pub path: Option<PathBuf>,
    pub vocabulary: VocabularyConfig,
    pub retry: RetryConfig,
}

/// Backoff applied when a write transaction loses a conflict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            min_delay_ms: 2,
            max_delay_ms: 200,
        }
    }
}

impl RetryConfig {
    pub(crate) fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub(crate) fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl StoreConfig {
    #[must_use]
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<StoreConfig> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    parse_config(&content)
}

/// Parse and validate YAML configuration text
pub fn parse_config(content: &str) -> Result<StoreConfig> {
    let config: StoreConfig = serde_yaml_ng::from_str(content)
        .map_err(|e| Error::Config(format!("Failed to parse YAML configuration: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_config(config: &StoreConfig) -> Result<()> {
    if config.retry.max_attempts == 0 {
        return Err(Error::Config(
            "retry.max_attempts must be greater than 0".to_string(),
        ));
    }
    if config.retry.min_delay_ms > config.retry.max_delay_ms {
        return Err(Error::Config(
            "retry.min_delay_ms cannot exceed retry.max_delay_ms".to_string(),
        ));
    }

    let vocab = &config.vocabulary;
    for (field, terms) in [
        ("variable_names", &vocab.variable_names),
        ("variable_types", &vocab.variable_types),
        ("method_types", &vocab.method_types),
    ] {
        if terms.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::Config(format!(
                "vocabulary.{field} cannot contain blank terms"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::VocabularyPolicy;

    #[test]
    fn test_parse_full_config() {
        let config = parse_config(
            r#"
path: /tmp/wells.duckdb
vocabulary:
  policy: warn
  variable_names: [casingStickup]
retry:
  max_attempts: 3
"#,
        )
        .unwrap();

        assert_eq!(config.path, Some(PathBuf::from("/tmp/wells.duckdb")));
        assert_eq!(config.vocabulary.policy, VocabularyPolicy::Warn);
        assert_eq!(config.vocabulary.variable_names, vec!["casingStickup"]);
        assert_eq!(config.retry.max_attempts, 3);
        // Unspecified fields keep their defaults.
        assert_eq!(config.retry.max_delay_ms, 200);
    }

    #[test]
    fn test_empty_config_is_in_memory_and_strict() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.path, None);
        assert_eq!(config.vocabulary.policy, VocabularyPolicy::Strict);
    }

    #[test]
    fn test_validation_failures() {
        assert!(parse_config("retry:\n  max_attempts: 0\n").is_err());
        assert!(parse_config("retry:\n  min_delay_ms: 500\n  max_delay_ms: 10\n").is_err());
        assert!(parse_config("vocabulary:\n  method_types: ['  ']\n").is_err());
        assert!(parse_config("vocabulary:\n  policy: lenient\n").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odm.yaml");
        std::fs::write(&path, "vocabulary:\n  variable_types: [Sediment]\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.vocabulary.variable_types, vec!["Sediment"]);

        assert!(load_config(dir.path().join("missing.yaml")).is_err());
    }
}
