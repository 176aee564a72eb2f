//! Authoritative persistence of active rules.
//!
//! Every write is a per-key compare-and-set against the version the caller
//! read, so two concurrent activations of the same key cannot merge into a
//! corrupted state: the loser gets `Conflict` and may retry.

pub mod redb_store;

use crate::deadline::{read_within, write_within, Deadline};
use crate::error::{QProfileError, Result};
use crate::types::{ActiveRule, ActiveRuleKey, QualityProfileKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

pub use redb_store::RedbActivationStore;

/// A stored value and its write version. Versions start at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

pub trait ActivationStore: Send + Sync {
    fn get(&self, key: &ActiveRuleKey, deadline: &Deadline)
        -> Result<Option<Versioned<ActiveRule>>>;

    /// Write `rule`. `expected` is the version read by the caller, `None`
    /// meaning the key must be absent. Returns the new version.
    fn put(&self, rule: &ActiveRule, expected: Option<u64>, deadline: &Deadline) -> Result<u64>;

    /// Remove the row at `key` if it is still at `expected`.
    fn remove(&self, key: &ActiveRuleKey, expected: u64, deadline: &Deadline) -> Result<()>;

    /// Every active rule of `profile`, in rule key order.
    fn list_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>>;

    /// Number of active rules per profile.
    fn profile_counts(&self, deadline: &Deadline) -> Result<BTreeMap<QualityProfileKey, usize>>;
}

pub(crate) fn check_version(
    key: &ActiveRuleKey,
    current: Option<u64>,
    expected: Option<u64>,
) -> Result<()> {
    if current == expected {
        return Ok(());
    }
    Err(QProfileError::Conflict(format!(
        "{key} was modified concurrently (expected version {}, found {})",
        version_label(expected),
        version_label(current),
    )))
}

fn version_label(v: Option<u64>) -> String {
    v.map_or_else(|| "none".to_string(), |v| v.to_string())
}

// ---------------------------------------------------------------------------
// MemoryActivationStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryActivationStore {
    rows: RwLock<BTreeMap<ActiveRuleKey, Versioned<ActiveRule>>>,
}

impl MemoryActivationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActivationStore for MemoryActivationStore {
    fn get(
        &self,
        key: &ActiveRuleKey,
        deadline: &Deadline,
    ) -> Result<Option<Versioned<ActiveRule>>> {
        let rows = read_within(&self.rows, deadline, "store.get")?;
        Ok(rows.get(key).cloned())
    }

    fn put(&self, rule: &ActiveRule, expected: Option<u64>, deadline: &Deadline) -> Result<u64> {
        let mut rows = write_within(&self.rows, deadline, "store.put")?;
        let current = rows.get(&rule.key).map(|v| v.version);
        check_version(&rule.key, current, expected)?;
        let version = current.unwrap_or(0) + 1;
        rows.insert(
            rule.key.clone(),
            Versioned {
                version,
                value: rule.clone(),
            },
        );
        Ok(version)
    }

    fn remove(&self, key: &ActiveRuleKey, expected: u64, deadline: &Deadline) -> Result<()> {
        let mut rows = write_within(&self.rows, deadline, "store.remove")?;
        let current = rows.get(key).map(|v| v.version);
        check_version(key, current, Some(expected))?;
        rows.remove(key);
        Ok(())
    }

    fn list_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>> {
        let rows = read_within(&self.rows, deadline, "store.list_by_profile")?;
        // Keys sort by profile first, so one profile's rows are contiguous
        Ok(rows
            .iter()
            .skip_while(|(k, _)| &k.profile < profile)
            .take_while(|(k, _)| &k.profile == profile)
            .map(|(_, v)| v.value.clone())
            .collect())
    }

    fn profile_counts(&self, deadline: &Deadline) -> Result<BTreeMap<QualityProfileKey, usize>> {
        let rows = read_within(&self.rows, deadline, "store.profile_counts")?;
        let mut counts = BTreeMap::new();
        for key in rows.keys() {
            *counts.entry(key.profile.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
