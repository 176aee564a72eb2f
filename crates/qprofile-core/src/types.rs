use crate::error::QProfileError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// QualityProfileKey
// ---------------------------------------------------------------------------

/// A profile is identified by its name within a language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualityProfileKey {
    pub name: String,
    pub language: String,
}

impl QualityProfileKey {
    pub fn new(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
        }
    }
}

impl fmt::Display for QualityProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.language, self.name)
    }
}

// ---------------------------------------------------------------------------
// RuleKey
// ---------------------------------------------------------------------------

/// Catalog rule identifier, written `repository:rule`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleKey {
    pub repository: String,
    pub rule: String,
}

impl RuleKey {
    pub fn new(repository: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            rule: rule.into(),
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.rule)
    }
}

impl std::str::FromStr for RuleKey {
    type Err = QProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((repo, rule)) if !repo.trim().is_empty() && !rule.trim().is_empty() => {
                Ok(RuleKey::new(repo.trim(), rule.trim()))
            }
            _ => Err(QProfileError::InvalidRuleKey(s.to_string())),
        }
    }
}

impl TryFrom<String> for RuleKey {
    type Error = QProfileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuleKey> for String {
    fn from(key: RuleKey) -> Self {
        key.to_string()
    }
}

// ---------------------------------------------------------------------------
// ActiveRuleKey
// ---------------------------------------------------------------------------

/// At most one [`ActiveRule`] exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActiveRuleKey {
    pub profile: QualityProfileKey,
    pub rule: RuleKey,
}

impl ActiveRuleKey {
    pub fn new(profile: QualityProfileKey, rule: RuleKey) -> Self {
        Self { profile, rule }
    }
}

impl fmt::Display for ActiveRuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.profile, self.rule)
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Severity {
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Info,
            Severity::Minor,
            Severity::Major,
            Severity::Critical,
            Severity::Blocker,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = QProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::all()
            .iter()
            .copied()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| QProfileError::InvalidSeverity(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

/// Where an active rule's configuration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Inheritance {
    /// Activated on the profile itself; no parent holds the rule.
    #[default]
    Own,
    /// Copied from the parent profile and kept in sync with it.
    Inherited,
    /// Inherited, then changed locally. Parent changes no longer reach it.
    Overridden,
}

impl Inheritance {
    pub fn as_str(self) -> &'static str {
        match self {
            Inheritance::Own => "OWN",
            Inheritance::Inherited => "INHERITED",
            Inheritance::Overridden => "OVERRIDDEN",
        }
    }
}

impl fmt::Display for Inheritance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActiveRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRule {
    pub key: ActiveRuleKey,
    pub severity: Severity,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub inheritance: Inheritance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveRule {
    pub fn new(
        key: ActiveRuleKey,
        severity: Severity,
        params: BTreeMap<String, String>,
        inheritance: Inheritance,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            severity,
            params,
            inheritance,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when severity and params equal the given values. Inheritance is
    /// not part of the comparison.
    pub fn has_values(&self, severity: Severity, params: &BTreeMap<String, String>) -> bool {
        self.severity == severity && &self.params == params
    }

    pub fn state(&self) -> RuleState {
        RuleState {
            severity: self.severity,
            params: self.params.clone(),
            inheritance: self.inheritance,
        }
    }

    /// Copy with new values and a fresh `updated_at`; `created_at` is kept.
    pub fn with_values(
        &self,
        severity: Severity,
        params: BTreeMap<String, String>,
        inheritance: Inheritance,
    ) -> Self {
        Self {
            key: self.key.clone(),
            severity,
            params,
            inheritance,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// ActiveRuleChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleState {
    pub severity: Severity,
    pub params: BTreeMap<String, String>,
    pub inheritance: Inheritance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Activated,
    Deactivated,
    Updated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Activated => "ACTIVATED",
            ChangeKind::Deactivated => "DEACTIVATED",
            ChangeKind::Updated => "UPDATED",
        })
    }
}

/// Audit record of one mutation. Built once by the engine and never modified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveRuleChange {
    kind: ChangeKind,
    key: ActiveRuleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<RuleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    after: Option<RuleState>,
}

impl ActiveRuleChange {
    pub(crate) fn activated(rule: &ActiveRule) -> Self {
        Self {
            kind: ChangeKind::Activated,
            key: rule.key.clone(),
            before: None,
            after: Some(rule.state()),
        }
    }

    pub(crate) fn deactivated(rule: &ActiveRule) -> Self {
        Self {
            kind: ChangeKind::Deactivated,
            key: rule.key.clone(),
            before: Some(rule.state()),
            after: None,
        }
    }

    pub(crate) fn updated(before: &ActiveRule, after: &ActiveRule) -> Self {
        Self {
            kind: ChangeKind::Updated,
            key: after.key.clone(),
            before: Some(before.state()),
            after: Some(after.state()),
        }
    }

    /// Fold a later change of the same key into this one. `None` when the
    /// two cancel out.
    pub(crate) fn followed_by(self, later: ActiveRuleChange) -> Option<Self> {
        let kind = match (&self.before, &later.after) {
            (None, None) => return None,
            (Some(before), Some(after)) if before == after => return None,
            (None, Some(_)) => ChangeKind::Activated,
            (Some(_), None) => ChangeKind::Deactivated,
            (Some(_), Some(_)) => ChangeKind::Updated,
        };
        Some(Self {
            kind,
            key: self.key,
            before: self.before,
            after: later.after,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn key(&self) -> &ActiveRuleKey {
        &self.key
    }

    pub fn before(&self) -> Option<&RuleState> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&RuleState> {
        self.after.as_ref()
    }
}
