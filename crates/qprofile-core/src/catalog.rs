//! Read-only view of the rule catalog.
//!
//! The engine never authors rules; it only needs a rule's language, default
//! severity and declared parameters to validate an activation, and a way to
//! select rules for bulk operations.

pub mod search;

use crate::error::{QProfileError, Result};
use crate::types::{RuleKey, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// Rule definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParamType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ParamType {
    pub fn accepts(self, value: &str) -> bool {
        match self {
            ParamType::String => true,
            ParamType::Integer => value.trim().parse::<i64>().is_ok(),
            ParamType::Float => value.trim().parse::<f64>().is_ok(),
            ParamType::Boolean => matches!(value.trim(), "true" | "false"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDefinition {
    pub name: String,
    #[serde(default, rename = "type")]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleStatus {
    #[default]
    Ready,
    Beta,
    Deprecated,
    /// Kept for history only; cannot be activated.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub key: RuleKey,
    pub name: String,
    pub language: String,
    #[serde(default = "default_severity")]
    pub default_severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub params: Vec<ParamDefinition>,
    #[serde(default)]
    pub status: RuleStatus,
}

fn default_severity() -> Severity {
    Severity::Major
}

impl RuleDefinition {
    pub fn new(key: RuleKey, name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            language: language.into(),
            default_severity: default_severity(),
            tags: Vec::new(),
            description: None,
            params: Vec::new(),
            status: RuleStatus::Ready,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    pub fn with_param(
        mut self,
        name: impl Into<String>,
        param_type: ParamType,
        default_value: Option<&str>,
    ) -> Self {
        self.params.push(ParamDefinition {
            name: name.into(),
            param_type,
            default_value: default_value.map(str::to_string),
            description: None,
        });
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn param(&self, name: &str) -> Option<&ParamDefinition> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Declared parameters that carry a default value.
    pub fn default_params(&self) -> BTreeMap<String, String> {
        self.params
            .iter()
            .filter_map(|p| p.default_value.clone().map(|v| (p.name.clone(), v)))
            .collect()
    }

    pub fn is_removed(&self) -> bool {
        self.status == RuleStatus::Removed
    }
}

// ---------------------------------------------------------------------------
// RuleQuery
// ---------------------------------------------------------------------------

/// Selection criteria for bulk operations. Empty lists match everything;
/// an empty `statuses` list matches every status except `REMOVED`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleQuery {
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub severities: Vec<Severity>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub statuses: Vec<RuleStatus>,
    /// Full-text query over key, name, description and tags.
    #[serde(default)]
    pub text: Option<String>,
}

impl RuleQuery {
    pub fn repository(mut self, repository: impl Into<String>) -> Self {
        self.repositories.push(repository.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.languages.push(language.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severities.push(severity);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Structural match; `text` is evaluated by the catalog's search index.
    pub fn matches(&self, rule: &RuleDefinition) -> bool {
        let status_ok = if self.statuses.is_empty() {
            !rule.is_removed()
        } else {
            self.statuses.contains(&rule.status)
        };
        status_ok
            && (self.repositories.is_empty() || self.repositories.contains(&rule.key.repository))
            && (self.languages.is_empty() || self.languages.contains(&rule.language))
            && (self.severities.is_empty() || self.severities.contains(&rule.default_severity))
            && (self.tags.is_empty() || self.tags.iter().any(|t| rule.tags.contains(t)))
    }
}

// ---------------------------------------------------------------------------
// RuleCatalog
// ---------------------------------------------------------------------------

pub trait RuleCatalog: Send + Sync {
    fn get_rule(&self, key: &RuleKey) -> Option<RuleDefinition>;

    /// Keys of every rule matching `query`, in key order.
    fn search(&self, query: &RuleQuery) -> Result<Vec<RuleKey>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    rules: Vec<RuleDefinition>,
}

/// Catalog held in memory, optionally loaded from a YAML file of the form
/// `rules: [ { key, name, language, ... } ]`.
#[derive(Debug, Default)]
pub struct MemoryRuleCatalog {
    rules: BTreeMap<RuleKey, RuleDefinition>,
}

impl MemoryRuleCatalog {
    pub fn new(rules: impl IntoIterator<Item = RuleDefinition>) -> Self {
        Self {
            rules: rules.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QProfileError::NotFound(format!(
                "rule catalog {}",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_yaml::from_str(&data)?;
        Ok(Self::new(file.rules))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = CatalogFile {
            rules: self.rules.values().cloned().collect(),
        };
        let data = serde_yaml::to_string(&file)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleCatalog for MemoryRuleCatalog {
    fn get_rule(&self, key: &RuleKey) -> Option<RuleDefinition> {
        self.rules.get(key).cloned()
    }

    fn search(&self, query: &RuleQuery) -> Result<Vec<RuleKey>> {
        let candidates: Vec<&RuleDefinition> =
            self.rules.values().filter(|r| query.matches(r)).collect();

        let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(candidates.into_iter().map(|r| r.key.clone()).collect());
        };

        let index = search::RuleTextIndex::build(&candidates)?;
        let hits: BTreeSet<RuleKey> = index
            .search(text, candidates.len())?
            .into_iter()
            .map(|hit| hit.key)
            .collect();
        Ok(hits.into_iter().collect())
    }
}
