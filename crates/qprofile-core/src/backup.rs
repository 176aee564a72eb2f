//! Profile export and import.
//!
//! A backup document lists a profile's active rules with their effective
//! severity and params, in rule key order:
//!
//! ```yaml
//! profile: { name: Sonar way, language: java }
//! rules:
//!   - rule_key: "squid:S001"
//!     severity: MAJOR
//!     params: { max: "10" }
//! ```
//!
//! Restore validates the whole document before touching anything, then
//! applies only the difference between the document and the store.

use crate::activator::{resolve_params, RuleActivation, RuleActivator};
use crate::deadline::Deadline;
use crate::error::{QProfileError, Result};
use crate::types::{
    ActiveRule, ActiveRuleChange, ActiveRuleKey, Inheritance, QualityProfileKey, RuleKey, Severity,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// One entry of a backup. Fields stay as text so that restore can report
/// every malformed entry instead of stopping at the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRule {
    pub rule_key: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl From<&ActiveRule> for BackupRule {
    fn from(rule: &ActiveRule) -> Self {
        Self {
            rule_key: rule.key.rule.to_string(),
            severity: rule.severity.to_string(),
            params: rule.params.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileBackupDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<QualityProfileKey>,
    #[serde(default)]
    pub rules: Vec<BackupRule>,
}

impl ProfileBackupDocument {
    pub fn new(profile: Option<QualityProfileKey>, mut rules: Vec<BackupRule>) -> Self {
        rules.sort_by(|a, b| a.rule_key.cmp(&b.rule_key));
        Self { profile, rules }
    }

    pub fn write_to(&self, writer: impl Write) -> Result<()> {
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Parse a document. Unreadable input is reported as `MalformedBackup`.
    pub fn read_from(reader: impl Read) -> Result<Self> {
        serde_yaml::from_reader(reader)
            .map_err(|e| QProfileError::MalformedBackup(vec![format!("unreadable document: {e}")]))
    }
}

/// A validated entry, with effective values.
struct Desired {
    severity: Severity,
    params: BTreeMap<String, String>,
}

pub struct ProfileBackupCodec {
    activator: Arc<RuleActivator>,
}

impl ProfileBackupCodec {
    pub fn new(activator: Arc<RuleActivator>) -> Self {
        Self { activator }
    }

    /// Snapshot of `profile`'s active rules, read from the index.
    pub fn backup(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<ProfileBackupDocument> {
        if self.activator.profiles().get(profile).is_none() {
            return Err(QProfileError::NotFound(format!("profile {profile}")));
        }
        let rules = self
            .activator
            .index()
            .find_by_profile(profile, deadline)?
            .iter()
            .map(BackupRule::from)
            .collect();
        Ok(ProfileBackupDocument::new(Some(profile.clone()), rules))
    }

    /// Make `profile` hold exactly the document's rules.
    ///
    /// Own bindings missing from the document are deactivated first, then
    /// missing or differing entries are activated, each group in rule key
    /// order. Inherited bindings missing from the document are left to their
    /// parent. A failure part way comes back as `PartiallyApplied` with the
    /// changes made so far; restoring the same document again finishes the
    /// job.
    pub fn restore(
        &self,
        document: &ProfileBackupDocument,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRuleChange>> {
        if self.activator.profiles().get(profile).is_none() {
            return Err(QProfileError::NotFound(format!("profile {profile}")));
        }
        let desired = self.validate(document, profile)?;

        let current: BTreeMap<RuleKey, ActiveRule> = self
            .activator
            .store()
            .list_by_profile(profile, deadline)?
            .into_iter()
            .map(|r| (r.key.rule.clone(), r))
            .collect();

        let to_remove: Vec<&RuleKey> = current
            .iter()
            .filter(|(rule, binding)| {
                binding.inheritance == Inheritance::Own && !desired.contains_key(*rule)
            })
            .map(|(rule, _)| rule)
            .collect();
        let to_apply: Vec<(&RuleKey, &Desired)> = desired
            .iter()
            .filter(|(rule, want)| {
                current
                    .get(*rule)
                    .map_or(true, |have| !have.has_values(want.severity, &want.params))
            })
            .collect();

        let mut changes = Vec::new();
        let mut stale_reason = None;
        let mut collect = |result: Result<Vec<ActiveRuleChange>>| -> Result<()> {
            match result {
                Ok(applied) => changes.extend(applied),
                Err(QProfileError::IndexStale {
                    changes: applied,
                    reason,
                }) => {
                    changes.extend(applied);
                    stale_reason.get_or_insert(reason);
                }
                Err(e) => return Err(e),
            }
            Ok(())
        };

        let applied = (|| -> Result<()> {
            for rule in &to_remove {
                let key = ActiveRuleKey::new(profile.clone(), (*rule).clone());
                collect(self.activator.deactivate(&key, deadline))?;
            }
            for (rule, want) in &to_apply {
                let activation = RuleActivation {
                    key: ActiveRuleKey::new(profile.clone(), (*rule).clone()),
                    severity: Some(want.severity),
                    params: want.params.clone(),
                };
                collect(self.activator.activate(&activation, deadline))?;
            }
            Ok(())
        })();
        drop(collect);

        if let Err(e) = applied {
            warn!(profile = %profile, applied = changes.len(), error = %e, "restore stopped part way");
            return Err(QProfileError::partially_applied(changes, e));
        }
        info!(
            profile = %profile,
            deactivated = to_remove.len(),
            activated = to_apply.len(),
            changes = changes.len(),
            "profile restored"
        );
        match stale_reason {
            Some(reason) => Err(QProfileError::IndexStale { changes, reason }),
            None => Ok(changes),
        }
    }

    /// Check every entry against the catalog and the target profile,
    /// collecting all problems.
    fn validate(
        &self,
        document: &ProfileBackupDocument,
        profile: &QualityProfileKey,
    ) -> Result<BTreeMap<RuleKey, Desired>> {
        let mut problems = Vec::new();
        let mut desired = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for (i, entry) in document.rules.iter().enumerate() {
            let position = i + 1;
            let rule_key: RuleKey = match entry.rule_key.parse() {
                Ok(key) => key,
                Err(_) => {
                    problems.push(format!(
                        "entry {position}: malformed rule key '{}'",
                        entry.rule_key
                    ));
                    continue;
                }
            };
            if !seen.insert(rule_key.clone()) {
                problems.push(format!("entry {position}: duplicate rule {rule_key}"));
                continue;
            }
            let severity = match entry.severity.parse::<Severity>() {
                Ok(s) => Some(s),
                Err(_) => {
                    problems.push(format!(
                        "entry {position}: unknown severity '{}' for {rule_key}",
                        entry.severity
                    ));
                    None
                }
            };
            let Some(rule) = self.activator.catalog().get_rule(&rule_key) else {
                problems.push(format!("entry {position}: unknown rule {rule_key}"));
                continue;
            };
            if rule.is_removed() {
                problems.push(format!("entry {position}: rule {rule_key} is removed"));
                continue;
            }
            if rule.language != profile.language {
                problems.push(format!(
                    "entry {position}: rule {rule_key} is a {} rule, profile {profile} is {}",
                    rule.language, profile.language
                ));
                continue;
            }
            let params = match resolve_params(&rule, &entry.params) {
                Ok(p) => p,
                Err(e) => {
                    problems.push(format!("entry {position}: {e}"));
                    continue;
                }
            };
            if let Some(severity) = severity {
                desired.insert(rule_key, Desired { severity, params });
            }
        }
        if !problems.is_empty() {
            return Err(QProfileError::MalformedBackup(problems));
        }
        Ok(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_sorts_rules_and_round_trips_through_yaml() {
        let doc = ProfileBackupDocument::new(
            Some(QualityProfileKey::new("Sonar way", "java")),
            vec![
                BackupRule {
                    rule_key: "squid:S2".into(),
                    severity: "MINOR".into(),
                    params: BTreeMap::new(),
                },
                BackupRule {
                    rule_key: "squid:S1".into(),
                    severity: "MAJOR".into(),
                    params: BTreeMap::from([("max".to_string(), "10".to_string())]),
                },
            ],
        );
        assert_eq!(doc.rules[0].rule_key, "squid:S1");

        let mut buf = Vec::new();
        doc.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("squid:S1"), "{text}");
        assert_eq!(ProfileBackupDocument::read_from(buf.as_slice()).unwrap(), doc);
    }

    #[test]
    fn unreadable_document_is_malformed() {
        let err = ProfileBackupDocument::read_from("rules: [ {".as_bytes()).unwrap_err();
        assert_eq!(err.kind(), "malformed_backup");
    }

    #[test]
    fn document_without_profile_parses() {
        let doc = ProfileBackupDocument::read_from(
            "rules:\n  - rule_key: squid:S1\n    severity: INFO\n".as_bytes(),
        )
        .unwrap();
        assert!(doc.profile.is_none());
        assert_eq!(doc.rules.len(), 1);
        assert!(doc.rules[0].params.is_empty());
    }
}
