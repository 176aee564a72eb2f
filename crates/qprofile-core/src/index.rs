//! Queryable secondary view of the activation store.
//!
//! The engine writes the index right after the store in the same call. Code
//! that must act on current data (cascades, restore diffs) reads the store
//! instead; the index serves lookups and bulk selection.

use crate::deadline::{read_within, write_within, Deadline};
use crate::error::Result;
use crate::types::{ActiveRule, ActiveRuleKey, Inheritance, QualityProfileKey, RuleKey, Severity};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Filter for [`ActiveRuleIndex::query`]. Empty lists match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveRuleCriteria {
    pub profile: Option<QualityProfileKey>,
    pub rule: Option<RuleKey>,
    pub languages: Vec<String>,
    pub repositories: Vec<String>,
    pub severities: Vec<Severity>,
    pub inheritance: Vec<Inheritance>,
}

impl ActiveRuleCriteria {
    pub fn for_profile(profile: QualityProfileKey) -> Self {
        Self {
            profile: Some(profile),
            ..Self::default()
        }
    }

    pub fn matches(&self, rule: &ActiveRule) -> bool {
        self.profile.as_ref().map_or(true, |p| p == &rule.key.profile)
            && self.rule.as_ref().map_or(true, |r| r == &rule.key.rule)
            && (self.languages.is_empty() || self.languages.contains(&rule.key.profile.language))
            && (self.repositories.is_empty()
                || self.repositories.contains(&rule.key.rule.repository))
            && (self.severities.is_empty() || self.severities.contains(&rule.severity))
            && (self.inheritance.is_empty() || self.inheritance.contains(&rule.inheritance))
    }
}

/// Result of [`ActiveRuleIndex::query`]: finite, consumed once.
pub type ActiveRuleKeys = Box<dyn Iterator<Item = ActiveRuleKey> + Send>;

pub trait ActiveRuleIndex: Send + Sync {
    fn upsert(&self, rule: &ActiveRule, deadline: &Deadline) -> Result<()>;

    fn delete(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<()>;

    fn get_by_key(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<Option<ActiveRule>>;

    /// Every binding of `rule` across profiles, in profile order.
    fn find_by_rule(&self, rule: &RuleKey, deadline: &Deadline) -> Result<Vec<ActiveRule>>;

    /// Every binding of `profile`, in rule key order.
    fn find_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>>;

    /// Keys of matching bindings, in key order.
    fn query(&self, criteria: &ActiveRuleCriteria, deadline: &Deadline) -> Result<ActiveRuleKeys>;

    /// Replace everything indexed for `profile` with `rules`. Used to resync
    /// from the store.
    fn replace_profile(
        &self,
        profile: &QualityProfileKey,
        rules: &[ActiveRule],
        deadline: &Deadline,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// MemoryActiveRuleIndex
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryActiveRuleIndex {
    docs: RwLock<BTreeMap<ActiveRuleKey, ActiveRule>>,
}

impl MemoryActiveRuleIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActiveRuleIndex for MemoryActiveRuleIndex {
    fn upsert(&self, rule: &ActiveRule, deadline: &Deadline) -> Result<()> {
        let mut docs = write_within(&self.docs, deadline, "index.upsert")?;
        docs.insert(rule.key.clone(), rule.clone());
        Ok(())
    }

    fn delete(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<()> {
        let mut docs = write_within(&self.docs, deadline, "index.delete")?;
        docs.remove(key);
        Ok(())
    }

    fn get_by_key(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<Option<ActiveRule>> {
        let docs = read_within(&self.docs, deadline, "index.get_by_key")?;
        Ok(docs.get(key).cloned())
    }

    fn find_by_rule(&self, rule: &RuleKey, deadline: &Deadline) -> Result<Vec<ActiveRule>> {
        let docs = read_within(&self.docs, deadline, "index.find_by_rule")?;
        Ok(docs
            .values()
            .filter(|d| &d.key.rule == rule)
            .cloned()
            .collect())
    }

    fn find_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>> {
        let docs = read_within(&self.docs, deadline, "index.find_by_profile")?;
        Ok(docs
            .values()
            .filter(|d| &d.key.profile == profile)
            .cloned()
            .collect())
    }

    fn query(&self, criteria: &ActiveRuleCriteria, deadline: &Deadline) -> Result<ActiveRuleKeys> {
        let docs = read_within(&self.docs, deadline, "index.query")?;
        let keys: Vec<ActiveRuleKey> = docs
            .values()
            .filter(|d| criteria.matches(d))
            .map(|d| d.key.clone())
            .collect();
        Ok(Box::new(keys.into_iter()))
    }

    fn replace_profile(
        &self,
        profile: &QualityProfileKey,
        rules: &[ActiveRule],
        deadline: &Deadline,
    ) -> Result<()> {
        let mut docs = write_within(&self.docs, deadline, "index.replace_profile")?;
        docs.retain(|k, _| &k.profile != profile);
        for rule in rules.iter().filter(|r| &r.key.profile == profile) {
            docs.insert(rule.key.clone(), rule.clone());
        }
        Ok(())
    }
}
