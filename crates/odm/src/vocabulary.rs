//! Controlled vocabulary for variable names, variable types and method types.

use crate::error::{Error, Result};
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const VARIABLE_NAMES: &[&str] = &[
    "bodyLength",
    "conductivity",
    "depth",
    "discharge",
    "distance",
    "elevation",
    "gageHeight",
    "groundwaterDepth",
    "offset",
    "oxygenDissolved",
    "oxygenDissolvedPercentOfSaturation",
    "pH",
    "precipitation",
    "pressureAbsolute",
    "pressureGauge",
    "salinity",
    "specificConductance",
    "temperature",
    "turbidity",
    "waterLevel",
    "waterLevelElevation",
    "wellDepth",
];

const VARIABLE_TYPES: &[&str] = &[
    "Biota",
    "Chemistry",
    "Climate",
    "Geology",
    "Hydrology",
    "Instrumentation",
    "Soil",
    "Unknown",
    "WaterQuality",
];

const METHOD_TYPES: &[&str] = &[
    "calculation",
    "dataRetrieval",
    "derivation",
    "estimation",
    "fieldActivity",
    "instrumentDeployment",
    "observation",
    "simulation",
    "specimenAnalysis",
];

/// What to do when a registration uses a term outside the vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyPolicy {
    /// Reject with `InvalidVocabulary`.
    #[default]
    Strict,
    /// Accept and log a warning.
    Warn,
}

/// Field a term is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    VariableName,
    VariableType,
    MethodType,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::VariableName => "variable name",
            Field::VariableType => "variable type",
            Field::MethodType => "method type",
        }
    }
}

/// App-level additions to the built-in term lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    pub policy: VocabularyPolicy,
    pub variable_names: Vec<String>,
    pub variable_types: Vec<String>,
    pub method_types: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Vocabulary {
    policy: VocabularyPolicy,
    variable_names: BTreeSet<String>,
    variable_types: BTreeSet<String>,
    method_types: BTreeSet<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::from_config(&VocabularyConfig::default())
    }
}

impl Vocabulary {
    #[must_use]
    pub fn from_config(config: &VocabularyConfig) -> Self {
        fn merge(builtin: &[&str], extra: &[String]) -> BTreeSet<String> {
            builtin
                .iter()
                .map(|s| (*s).to_string())
                .chain(extra.iter().map(|s| s.trim().to_string()))
                .collect()
        }

        Self {
            policy: config.policy,
            variable_names: merge(VARIABLE_NAMES, &config.variable_names),
            variable_types: merge(VARIABLE_TYPES, &config.variable_types),
            method_types: merge(METHOD_TYPES, &config.method_types),
        }
    }

    #[must_use]
    pub fn policy(&self) -> VocabularyPolicy {
        self.policy
    }

    /// Extend the vocabulary at runtime.
    pub fn extend(&mut self, field: Field, term: &str) {
        _ = self.terms_mut(field).insert(term.to_string());
    }

    #[must_use]
    pub fn contains(&self, field: Field, term: &str) -> bool {
        self.terms(field).contains(term)
    }

    pub fn terms(&self, field: Field) -> &BTreeSet<String> {
        match field {
            Field::VariableName => &self.variable_names,
            Field::VariableType => &self.variable_types,
            Field::MethodType => &self.method_types,
        }
    }

    fn terms_mut(&mut self, field: Field) -> &mut BTreeSet<String> {
        match field {
            Field::VariableName => &mut self.variable_names,
            Field::VariableType => &mut self.variable_types,
            Field::MethodType => &mut self.method_types,
        }
    }

    /// Check a term according to the policy.
    pub fn check(&self, field: Field, term: &str) -> Result<()> {
        if self.contains(field, term) {
            return Ok(());
        }
        let label = field.label();
        match self.policy {
            VocabularyPolicy::Strict => Err(Error::InvalidVocabulary {
                field: label.to_string(),
                term: term.to_string(),
            }),
            VocabularyPolicy::Warn => {
                warn!("Accepting unrecognized {label} '{term}'", label, term);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_terms() {
        let vocab = Vocabulary::default();
        assert!(vocab.contains(Field::VariableName, "gageHeight"));
        assert!(vocab.contains(Field::VariableName, "groundwaterDepth"));
        assert!(vocab.contains(Field::MethodType, "derivation"));
        assert!(!vocab.contains(Field::VariableName, "GageHeight"));
    }

    #[test]
    fn test_strict_rejects_unknown_term() {
        let vocab = Vocabulary::default();
        let err = vocab.check(Field::VariableName, "wellGeometry").unwrap_err();
        match err {
            Error::InvalidVocabulary { field, term } => {
                assert_eq!(field, "variable name");
                assert_eq!(term, "wellGeometry");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_warn_policy_accepts_unknown_term() {
        let vocab = Vocabulary::from_config(&VocabularyConfig {
            policy: VocabularyPolicy::Warn,
            ..Default::default()
        });
        assert!(vocab.check(Field::VariableType, "Sediment").is_ok());
    }

    #[test]
    fn test_config_and_runtime_extension() {
        let mut vocab = Vocabulary::from_config(&VocabularyConfig {
            variable_names: vec![" casingStickup ".to_string()],
            ..Default::default()
        });
        assert!(vocab.check(Field::VariableName, "casingStickup").is_ok());

        assert!(vocab.check(Field::MethodType, "qualityControl").is_err());
        vocab.extend(Field::MethodType, "qualityControl");
        assert!(vocab.check(Field::MethodType, "qualityControl").is_ok());
    }
}
