//! Single-rule activation and deactivation, with inheritance cascade.
//!
//! Every mutation is written to the store first, one compare-and-set per key,
//! then mirrored into the index. Cascade decisions always read the store.

use crate::catalog::{RuleCatalog, RuleDefinition};
use crate::deadline::Deadline;
use crate::error::{QProfileError, Result};
use crate::index::ActiveRuleIndex;
use crate::monitor::EngineStats;
use crate::profile::{ProfileRegistry, QualityProfile};
use crate::store::{ActivationStore, Versioned};
use crate::types::{
    ActiveRule, ActiveRuleChange, ActiveRuleKey, Inheritance, QualityProfileKey, Severity,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request to bind one rule to one profile.
///
/// `severity: None` means the rule's default severity. `params` override the
/// rule's parameter defaults; an empty value resets a parameter to its
/// default.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleActivation {
    pub key: ActiveRuleKey,
    pub severity: Option<Severity>,
    pub params: BTreeMap<String, String>,
}

impl RuleActivation {
    pub fn new(key: ActiveRuleKey) -> Self {
        Self {
            key,
            severity: None,
            params: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// Effective parameter set: the rule's defaults overlaid with `requested`.
pub(crate) fn resolve_params(
    rule: &RuleDefinition,
    requested: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>> {
    let mut params = rule.default_params();
    for (name, value) in requested {
        let Some(def) = rule.param(name) else {
            return Err(QProfileError::InvalidParameter(format!(
                "rule {} has no parameter '{name}'",
                rule.key
            )));
        };
        if value.is_empty() {
            match &def.default_value {
                Some(default) => params.insert(name.clone(), default.clone()),
                None => params.remove(name),
            };
            continue;
        }
        if !def.param_type.accepts(value) {
            return Err(QProfileError::InvalidParameter(format!(
                "value '{value}' of parameter '{name}' on rule {} is not a valid {:?}",
                rule.key, def.param_type
            )));
        }
        params.insert(name.clone(), value.clone());
    }
    Ok(params)
}

// ---------------------------------------------------------------------------
// Pending writes
// ---------------------------------------------------------------------------

enum IndexOp {
    Upsert(ActiveRule),
    Delete(ActiveRuleKey),
}

/// Store writes already applied during one call, with the index operations
/// that mirror them. Changes to a key already touched by the call are folded
/// into its first change, so each key is reported once.
struct Pending<'a> {
    store: &'a dyn ActivationStore,
    deadline: &'a Deadline,
    changes: Vec<ActiveRuleChange>,
    index_ops: Vec<IndexOp>,
}

impl<'a> Pending<'a> {
    fn new(store: &'a dyn ActivationStore, deadline: &'a Deadline) -> Self {
        Self {
            store,
            deadline,
            changes: Vec::new(),
            index_ops: Vec::new(),
        }
    }

    fn insert(&mut self, rule: ActiveRule) -> Result<()> {
        self.store.put(&rule, None, self.deadline)?;
        self.record(ActiveRuleChange::activated(&rule));
        self.index_ops.push(IndexOp::Upsert(rule));
        Ok(())
    }

    fn update(&mut self, current: &Versioned<ActiveRule>, rule: ActiveRule) -> Result<()> {
        self.store.put(&rule, Some(current.version), self.deadline)?;
        self.record(ActiveRuleChange::updated(&current.value, &rule));
        self.index_ops.push(IndexOp::Upsert(rule));
        Ok(())
    }

    fn remove(&mut self, current: &Versioned<ActiveRule>) -> Result<()> {
        self.store
            .remove(&current.value.key, current.version, self.deadline)?;
        self.record(ActiveRuleChange::deactivated(&current.value));
        self.index_ops
            .push(IndexOp::Delete(current.value.key.clone()));
        Ok(())
    }

    fn record(&mut self, change: ActiveRuleChange) {
        match self.changes.iter().position(|c| c.key() == change.key()) {
            Some(i) => {
                let earlier = self.changes.remove(i);
                if let Some(folded) = earlier.followed_by(change) {
                    self.changes.insert(i, folded);
                }
            }
            None => self.changes.push(change),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleActivator
// ---------------------------------------------------------------------------

pub struct RuleActivator {
    store: Arc<dyn ActivationStore>,
    index: Arc<dyn ActiveRuleIndex>,
    catalog: Arc<dyn RuleCatalog>,
    profiles: Arc<dyn ProfileRegistry>,
    stats: Arc<EngineStats>,
    max_depth: usize,
}

impl RuleActivator {
    pub fn new(
        store: Arc<dyn ActivationStore>,
        index: Arc<dyn ActiveRuleIndex>,
        catalog: Arc<dyn RuleCatalog>,
        profiles: Arc<dyn ProfileRegistry>,
        stats: Arc<EngineStats>,
        max_depth: usize,
    ) -> Self {
        Self {
            store,
            index,
            catalog,
            profiles,
            stats,
            max_depth,
        }
    }

    pub fn catalog(&self) -> &dyn RuleCatalog {
        self.catalog.as_ref()
    }

    pub fn profiles(&self) -> &dyn ProfileRegistry {
        self.profiles.as_ref()
    }

    pub fn store(&self) -> &dyn ActivationStore {
        self.store.as_ref()
    }

    pub fn index(&self) -> &dyn ActiveRuleIndex {
        self.index.as_ref()
    }

    fn profile(&self, key: &QualityProfileKey) -> Result<QualityProfile> {
        self.profiles
            .get(key)
            .ok_or_else(|| QProfileError::NotFound(format!("profile {key}")))
    }

    /// Look up the rule of `key` and check it can live in `profile`.
    fn activatable_rule(
        &self,
        profile: &QualityProfile,
        key: &ActiveRuleKey,
    ) -> Result<RuleDefinition> {
        let rule = self
            .catalog
            .get_rule(&key.rule)
            .filter(|r| !r.is_removed())
            .ok_or_else(|| QProfileError::NotFound(format!("rule {}", key.rule)))?;
        if rule.language != profile.key.language {
            return Err(QProfileError::InvalidActivation(format!(
                "rule {} is a {} rule and cannot be activated on {} profile {}",
                rule.key, rule.language, profile.key.language, profile.key
            )));
        }
        Ok(rule)
    }

    /// Severity and params the binding would hold after `activation`.
    pub(crate) fn effective_values(
        &self,
        activation: &RuleActivation,
    ) -> Result<(Severity, BTreeMap<String, String>)> {
        let profile = self.profile(&activation.key.profile)?;
        let rule = self.activatable_rule(&profile, &activation.key)?;
        let params = resolve_params(&rule, &activation.params)?;
        Ok((activation.severity.unwrap_or(rule.default_severity), params))
    }

    fn parent_binding(
        &self,
        profile: &QualityProfile,
        key: &ActiveRuleKey,
        deadline: &Deadline,
    ) -> Result<Option<ActiveRule>> {
        let Some(parent) = &profile.parent else {
            return Ok(None);
        };
        let parent_key = ActiveRuleKey::new(parent.clone(), key.rule.clone());
        Ok(self.store.get(&parent_key, deadline)?.map(|v| v.value))
    }

    /// Activate or update one rule on one profile and propagate it to
    /// descendant profiles.
    pub fn activate(
        &self,
        activation: &RuleActivation,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRuleChange>> {
        let key = &activation.key;
        let profile = self.profile(&key.profile)?;
        let rule = self.activatable_rule(&profile, key)?;
        let params = resolve_params(&rule, &activation.params)?;
        let severity = activation.severity.unwrap_or(rule.default_severity);

        let inheritance = match self.parent_binding(&profile, key, deadline)? {
            Some(parent) if parent.has_values(severity, &params) => Inheritance::Inherited,
            Some(_) => Inheritance::Overridden,
            None => Inheritance::Own,
        };

        let current = self.store.get(key, deadline)?;

        // An unchanged binding still walks its descendants: a call that
        // stopped part way through the cascade is completed by repeating it.
        let mut pending = Pending::new(self.store.as_ref(), deadline);
        let outcome = (|| -> Result<()> {
            let written = match &current {
                Some(current)
                    if current.value.has_values(severity, &params)
                        && current.value.inheritance == inheritance =>
                {
                    debug!(key = %key, "activation unchanged");
                    current.value.clone()
                }
                Some(current) => {
                    let updated = current.value.with_values(severity, params, inheritance);
                    pending.update(current, updated.clone())?;
                    updated
                }
                None => {
                    let created = ActiveRule::new(key.clone(), severity, params, inheritance);
                    pending.insert(created.clone())?;
                    created
                }
            };
            let mut visited = BTreeSet::from([key.profile.clone()]);
            self.cascade_values(&mut pending, &key.profile, &written, 1, &mut visited)
        })();
        let changes = self.finish(pending, outcome, deadline)?;
        info!(key = %key, severity = %severity, changes = changes.len(), "rule activated");
        Ok(changes)
    }

    /// Remove one rule from one profile. Inherited copies in descendant
    /// profiles go with it; overridden copies are kept as own bindings.
    pub fn deactivate(
        &self,
        key: &ActiveRuleKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRuleChange>> {
        let profile = self.profile(&key.profile)?;
        if self.catalog.get_rule(&key.rule).is_none() {
            return Err(QProfileError::NotFound(format!("rule {}", key.rule)));
        }
        let Some(current) = self.store.get(key, deadline)? else {
            debug!(key = %key, "rule not active, nothing to deactivate");
            // Inherited copies left behind by an interrupted call.
            let mut pending = Pending::new(self.store.as_ref(), deadline);
            let mut visited = BTreeSet::from([key.profile.clone()]);
            let outcome = self.cascade_removal(&mut pending, key, 1, &mut visited);
            return self.finish(pending, outcome, deadline);
        };
        if current.value.inheritance != Inheritance::Own
            && self.parent_binding(&profile, key, deadline)?.is_some()
        {
            return Err(QProfileError::InvalidActivation(format!(
                "cannot deactivate inherited rule {}: it is active on the parent profile",
                key.rule
            )));
        }

        let mut pending = Pending::new(self.store.as_ref(), deadline);
        let outcome = (|| -> Result<()> {
            pending.remove(&current)?;
            let mut visited = BTreeSet::from([key.profile.clone()]);
            self.cascade_removal(&mut pending, key, 1, &mut visited)
        })();
        let changes = self.finish(pending, outcome, deadline)?;
        info!(key = %key, changes = changes.len(), "rule deactivated");
        Ok(changes)
    }

    /// Re-parent `profile`: bindings inherited from the old parent are
    /// dropped (overridden ones become own), then every binding of the new
    /// parent is propagated down.
    pub fn set_parent(
        &self,
        profile: &QualityProfileKey,
        parent: Option<QualityProfileKey>,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRuleChange>> {
        let current = self.profile(profile)?;
        let changed = current.parent != parent;
        if changed {
            self.profiles.set_parent(profile, parent.clone())?;
        } else if parent.is_none() {
            debug!(profile = %profile, "parent unchanged");
            return Ok(Vec::new());
        }

        // With the parent unchanged only the propagation runs, which writes
        // nothing once the profile is in sync with its parent.
        let mut pending = Pending::new(self.store.as_ref(), deadline);
        let outcome = (|| -> Result<()> {
            if changed && current.parent.is_some() {
                self.detach(&mut pending, profile)?;
            }
            if let Some(parent) = &parent {
                for binding in self.store.list_by_profile(parent, deadline)? {
                    let mut visited = BTreeSet::from([parent.clone()]);
                    self.propagate(&mut pending, profile, &binding, 1, &mut visited)?;
                }
            }
            Ok(())
        })();
        let changes = self.finish(pending, outcome, deadline)?;
        info!(
            profile = %profile,
            parent = ?parent,
            changes = changes.len(),
            "profile parent changed"
        );
        Ok(changes)
    }

    fn detach(&self, pending: &mut Pending<'_>, profile: &QualityProfileKey) -> Result<()> {
        for binding in self.store.list_by_profile(profile, pending.deadline)? {
            let Some(current) = self.store.get(&binding.key, pending.deadline)? else {
                continue;
            };
            match current.value.inheritance {
                Inheritance::Inherited => {
                    pending.remove(&current)?;
                    let mut visited = BTreeSet::from([profile.clone()]);
                    self.cascade_removal(pending, &binding.key, 1, &mut visited)?;
                }
                Inheritance::Overridden => {
                    let own = current.value.with_values(
                        current.value.severity,
                        current.value.params.clone(),
                        Inheritance::Own,
                    );
                    pending.update(&current, own)?;
                }
                Inheritance::Own => {}
            }
        }
        Ok(())
    }

    /// Push `source`'s values to every child of `profile`.
    fn cascade_values(
        &self,
        pending: &mut Pending<'_>,
        profile: &QualityProfileKey,
        source: &ActiveRule,
        depth: usize,
        visited: &mut BTreeSet<QualityProfileKey>,
    ) -> Result<()> {
        for child in self.profiles.children(profile) {
            self.propagate(pending, &child, source, depth, visited)?;
        }
        Ok(())
    }

    /// Apply a parent binding to `child`, then continue below it where the
    /// child follows its parent.
    fn propagate(
        &self,
        pending: &mut Pending<'_>,
        child: &QualityProfileKey,
        source: &ActiveRule,
        depth: usize,
        visited: &mut BTreeSet<QualityProfileKey>,
    ) -> Result<()> {
        if !visited.insert(child.clone()) {
            return Ok(());
        }
        if depth > self.max_depth {
            warn!(profile = %child, max_depth = self.max_depth, "inheritance depth exceeded, cascade stopped");
            return Ok(());
        }
        let key = ActiveRuleKey::new(child.clone(), source.key.rule.clone());
        let (severity, params) = (source.severity, source.params.clone());

        let written = match self.store.get(&key, pending.deadline)? {
            None => {
                let copy = ActiveRule::new(key, severity, params, Inheritance::Inherited);
                pending.insert(copy.clone())?;
                copy
            }
            Some(current) => match current.value.inheritance {
                Inheritance::Overridden => return Ok(()),
                Inheritance::Inherited if current.value.has_values(severity, &params) => {
                    current.value
                }
                Inheritance::Inherited => {
                    let copy = current
                        .value
                        .with_values(severity, params, Inheritance::Inherited);
                    pending.update(&current, copy.clone())?;
                    copy
                }
                Inheritance::Own => {
                    let follows = current.value.has_values(severity, &params);
                    let inheritance = if follows {
                        Inheritance::Inherited
                    } else {
                        Inheritance::Overridden
                    };
                    let relabeled = current.value.with_values(
                        current.value.severity,
                        current.value.params.clone(),
                        inheritance,
                    );
                    pending.update(&current, relabeled.clone())?;
                    if !follows {
                        return Ok(());
                    }
                    relabeled
                }
            },
        };
        self.cascade_values(pending, child, &written, depth + 1, visited)
    }

    /// After `key` was removed, drop inherited copies below it and turn
    /// overridden copies into own bindings.
    fn cascade_removal(
        &self,
        pending: &mut Pending<'_>,
        key: &ActiveRuleKey,
        depth: usize,
        visited: &mut BTreeSet<QualityProfileKey>,
    ) -> Result<()> {
        for child in self.profiles.children(&key.profile) {
            if !visited.insert(child.clone()) {
                continue;
            }
            if depth > self.max_depth {
                warn!(profile = %child, max_depth = self.max_depth, "inheritance depth exceeded, cascade stopped");
                continue;
            }
            let child_key = ActiveRuleKey::new(child, key.rule.clone());
            let Some(current) = self.store.get(&child_key, pending.deadline)? else {
                continue;
            };
            match current.value.inheritance {
                Inheritance::Inherited => {
                    pending.remove(&current)?;
                    self.cascade_removal(pending, &child_key, depth + 1, visited)?;
                }
                Inheritance::Overridden => {
                    let own = current.value.with_values(
                        current.value.severity,
                        current.value.params.clone(),
                        Inheritance::Own,
                    );
                    pending.update(&current, own)?;
                }
                Inheritance::Own => {}
            }
        }
        Ok(())
    }

    /// Mirror applied store writes into the index and settle the result.
    ///
    /// A store failure comes back as `PartiallyApplied` when writes were
    /// applied before it; those writes stay and are still mirrored. An index
    /// failure after a clean store pass becomes `IndexStale` carrying every
    /// applied change.
    fn finish(
        &self,
        pending: Pending<'_>,
        outcome: Result<()>,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRuleChange>> {
        let index_result = self.flush_index(&pending.index_ops, deadline);
        if let Err(e) = &index_result {
            self.stats.record_stale_index();
            warn!(error = %e, changes = pending.changes.len(), "index update failed after store write");
        }
        if let Err(e) = outcome {
            return Err(QProfileError::partially_applied(pending.changes, e));
        }
        match index_result {
            Ok(()) => Ok(pending.changes),
            Err(e) => Err(QProfileError::IndexStale {
                changes: pending.changes,
                reason: e.to_string(),
            }),
        }
    }

    fn flush_index(&self, ops: &[IndexOp], deadline: &Deadline) -> Result<()> {
        let mut first_error = None;
        for op in ops {
            let result = match op {
                IndexOp::Upsert(rule) => self.index.upsert(rule, deadline),
                IndexOp::Delete(key) => self.index.delete(key, deadline),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Rebuild the index content of `profile` from the store.
    pub fn resync(&self, profile: &QualityProfileKey, deadline: &Deadline) -> Result<usize> {
        let rules = self.store.list_by_profile(profile, deadline)?;
        self.index.replace_profile(profile, &rules, deadline)?;
        Ok(rules.len())
    }
}
