//! Apply one activation or deactivation to every rule matching a query.
//!
//! A bulk call is a sequence of independent single-rule operations, run in
//! rule key order. One rule failing does not stop the batch; only an expired
//! deadline does, and then every remaining rule is reported as timed out.
//! The index may lag the store between two rules of the same batch.

use crate::activator::{RuleActivation, RuleActivator};
use crate::catalog::{RuleQuery, RuleStatus};
use crate::deadline::Deadline;
use crate::error::{QProfileError, Result};
use crate::index::ActiveRuleCriteria;
use crate::types::{ActiveRuleChange, ActiveRuleKey, QualityProfileKey, RuleKey, Severity};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct BulkActivation {
    pub query: RuleQuery,
    pub profile: QualityProfileKey,
    pub severity: Option<Severity>,
    pub params: BTreeMap<String, String>,
}

impl BulkActivation {
    pub fn new(query: RuleQuery, profile: QualityProfileKey) -> Self {
        Self {
            query,
            profile,
            severity: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkOutcome {
    Succeeded {
        changes: Vec<ActiveRuleChange>,
        /// The store holds the changes but the index missed some of them.
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        index_stale: bool,
    },
    Failed {
        kind: String,
        reason: String,
        /// Store writes made for this rule before the failure.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        applied: Vec<ActiveRuleChange>,
    },
}

impl BulkOutcome {
    fn from_result(result: Result<Vec<ActiveRuleChange>>) -> Self {
        match result {
            Ok(changes) => BulkOutcome::Succeeded {
                changes,
                index_stale: false,
            },
            Err(QProfileError::IndexStale { changes, .. }) => BulkOutcome::Succeeded {
                changes,
                index_stale: true,
            },
            Err(e) => BulkOutcome::Failed {
                kind: e.kind().to_string(),
                reason: e.to_string(),
                applied: e.applied_changes().to_vec(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BulkOutcome::Succeeded { .. })
    }
}

/// Per-rule outcome of a bulk call, keyed and ordered by rule key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub outcomes: BTreeMap<RuleKey, BulkOutcome>,
}

impl BulkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn stale(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, BulkOutcome::Succeeded { index_stale: true, .. }))
            .count()
    }

    /// Every change applied by the batch, in rule key order.
    pub fn changes(&self) -> impl Iterator<Item = &ActiveRuleChange> {
        self.outcomes.values().flat_map(|o| match o {
            BulkOutcome::Succeeded { changes, .. } => changes.as_slice(),
            BulkOutcome::Failed { applied, .. } => applied.as_slice(),
        })
    }
}

pub struct BulkActivationCoordinator {
    activator: Arc<RuleActivator>,
}

impl BulkActivationCoordinator {
    pub fn new(activator: Arc<RuleActivator>) -> Self {
        Self { activator }
    }

    pub fn bulk_activate(&self, request: &BulkActivation, deadline: &Deadline) -> Result<BulkReport> {
        let language = self.profile_language(&request.profile)?;
        let mut query = request.query.clone();
        if query.languages.is_empty() {
            query.languages.push(language);
        }
        let rules: BTreeSet<RuleKey> = self.activator.catalog().search(&query)?.into_iter().collect();

        let report = self.run(rules, deadline, |rule| {
            let activation = RuleActivation {
                key: ActiveRuleKey::new(request.profile.clone(), rule.clone()),
                severity: request.severity,
                params: request.params.clone(),
            };
            self.activator.activate(&activation, deadline)
        });
        info!(
            profile = %request.profile,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "bulk activation finished"
        );
        Ok(report)
    }

    /// Deactivate the rules of `profile` matching `query`. `query.severities`
    /// filters on the severity the rule is active with, not its default.
    pub fn bulk_deactivate(
        &self,
        query: &RuleQuery,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<BulkReport> {
        let language = self.profile_language(profile)?;
        let criteria = ActiveRuleCriteria {
            repositories: query.repositories.clone(),
            severities: query.severities.clone(),
            ..ActiveRuleCriteria::for_profile(profile.clone())
        };
        let active: BTreeSet<RuleKey> = self
            .activator
            .index()
            .query(&criteria, deadline)?
            .map(|key| key.rule)
            .collect();

        let mut catalog_query = query.clone();
        catalog_query.severities.clear();
        if catalog_query.statuses.is_empty() {
            catalog_query.statuses = vec![
                RuleStatus::Ready,
                RuleStatus::Beta,
                RuleStatus::Deprecated,
                RuleStatus::Removed,
            ];
        }
        if catalog_query.languages.is_empty() {
            catalog_query.languages.push(language);
        }
        let rules: BTreeSet<RuleKey> = self
            .activator
            .catalog()
            .search(&catalog_query)?
            .into_iter()
            .filter(|rule| active.contains(rule))
            .collect();

        let report = self.run(rules, deadline, |rule| {
            self.activator
                .deactivate(&ActiveRuleKey::new(profile.clone(), rule.clone()), deadline)
        });
        info!(
            profile = %profile,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "bulk deactivation finished"
        );
        Ok(report)
    }

    fn profile_language(&self, profile: &QualityProfileKey) -> Result<String> {
        self.activator
            .profiles()
            .get(profile)
            .map(|p| p.key.language)
            .ok_or_else(|| QProfileError::NotFound(format!("profile {profile}")))
    }

    fn run(
        &self,
        rules: BTreeSet<RuleKey>,
        deadline: &Deadline,
        mut apply: impl FnMut(&RuleKey) -> Result<Vec<ActiveRuleChange>>,
    ) -> BulkReport {
        let mut report = BulkReport::default();
        for rule in rules {
            let result = match deadline.check("bulk") {
                Ok(()) => apply(&rule),
                Err(e) => Err(e),
            };
            let outcome = BulkOutcome::from_result(result);
            if let BulkOutcome::Failed { kind, reason, .. } = &outcome {
                warn!(rule = %rule, kind = %kind, reason = %reason, "bulk step failed");
            }
            report.outcomes.insert(rule, outcome);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes_for(kind: &str) -> BulkOutcome {
        match kind {
            "ok" => BulkOutcome::Succeeded {
                changes: vec![],
                index_stale: false,
            },
            "stale" => BulkOutcome::Succeeded {
                changes: vec![],
                index_stale: true,
            },
            _ => BulkOutcome::Failed {
                kind: "invalid_parameter".into(),
                reason: "bad".into(),
                applied: vec![],
            },
        }
    }

    #[test]
    fn report_counts() {
        let mut report = BulkReport::default();
        for (i, kind) in ["ok", "stale", "failed", "ok"].iter().enumerate() {
            report
                .outcomes
                .insert(RuleKey::new("squid", format!("S{i}")), changes_for(kind));
        }
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.stale(), 1);
    }

    #[test]
    fn index_stale_counts_as_success() {
        let outcome = BulkOutcome::from_result(Err(QProfileError::IndexStale {
            changes: vec![],
            reason: "offline".into(),
        }));
        assert_eq!(outcome, changes_for("stale"));
        let outcome = BulkOutcome::from_result(Err(QProfileError::timeout("bulk")));
        assert!(matches!(outcome, BulkOutcome::Failed { ref kind, .. } if kind == "timeout"));
    }

    #[test]
    fn failure_after_store_writes_keeps_them_in_the_report() {
        use crate::types::{ActiveRule, ActiveRuleKey, Inheritance, QualityProfileKey};

        let rule = ActiveRule::new(
            ActiveRuleKey::new(QualityProfileKey::new("p", "java"), RuleKey::new("squid", "S1")),
            Severity::Major,
            BTreeMap::new(),
            Inheritance::Own,
        );
        let err = QProfileError::partially_applied(
            vec![ActiveRuleChange::activated(&rule)],
            QProfileError::Conflict("child busy".into()),
        );
        let outcome = BulkOutcome::from_result(Err(err));
        match &outcome {
            BulkOutcome::Failed { kind, applied, .. } => {
                assert_eq!(kind, "conflict");
                assert_eq!(applied.len(), 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let mut report = BulkReport::default();
        report.outcomes.insert(RuleKey::new("squid", "S1"), outcome);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.changes().count(), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"]["squid:S1"]["applied"][0]["kind"], "ACTIVATED");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(changes_for("failed")).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "invalid_parameter");
        assert!(json.get("applied").is_none());
        let json = serde_json::to_value(changes_for("ok")).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json.get("index_stale").is_none());
    }
}
