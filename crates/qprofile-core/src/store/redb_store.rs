//! On-disk [`ActivationStore`] using redb.
//!
//! # Table design
//!
//! A single `ACTIVE_RULES` table keyed by
//! ```text
//! [ language | 0x00 | profile name | 0x00 | repository | 0x00 | rule ]
//! ```
//! so all rows of one profile are contiguous and a range scan
//! `prefix .. prefix_end` lists them in rule key order. Values are the
//! JSON-encoded `Versioned<ActiveRule>`.
//!
//! Compare-and-set happens inside a single redb write transaction; redb
//! serializes writers, so the version check and the write are atomic.
//!
//! # Deadlines
//!
//! `begin_write` waits, without a timeout, for any other open write
//! transaction. The deadline is checked before that wait and again before
//! commit, so a write that waited past its deadline fails with `Timeout` and
//! is aborted, never committed late. The wait itself is bounded only by the
//! other writer; all writers here are short single-key transactions.

use std::collections::BTreeMap;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};

use super::{check_version, ActivationStore, Versioned};
use crate::deadline::Deadline;
use crate::error::{QProfileError, Result};
use crate::types::{ActiveRule, ActiveRuleKey, QualityProfileKey};

const ACTIVE_RULES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("active_rules");

const SEP: u8 = 0x00;

fn store_err(e: impl std::fmt::Display) -> QProfileError {
    QProfileError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn push_part(buf: &mut Vec<u8>, part: &str) -> Result<()> {
    if part.as_bytes().contains(&SEP) {
        return Err(QProfileError::InvalidParameter(format!(
            "key component {part:?} contains a NUL byte"
        )));
    }
    buf.extend_from_slice(part.as_bytes());
    Ok(())
}

fn profile_prefix(profile: &QualityProfileKey) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    push_part(&mut buf, &profile.language)?;
    buf.push(SEP);
    push_part(&mut buf, &profile.name)?;
    buf.push(SEP);
    Ok(buf)
}

/// Exclusive upper bound for a profile's rows: the prefix with its trailing
/// separator bumped by one.
fn profile_prefix_end(profile: &QualityProfileKey) -> Result<Vec<u8>> {
    let mut end = profile_prefix(profile)?;
    if let Some(last) = end.last_mut() {
        *last = SEP + 1;
    }
    Ok(end)
}

fn row_key(key: &ActiveRuleKey) -> Result<Vec<u8>> {
    let mut buf = profile_prefix(&key.profile)?;
    push_part(&mut buf, &key.rule.repository)?;
    buf.push(SEP);
    push_part(&mut buf, &key.rule.rule)?;
    Ok(buf)
}

fn decode(bytes: &[u8]) -> Result<Versioned<ActiveRule>> {
    serde_json::from_slice(bytes).map_err(store_err)
}

// ---------------------------------------------------------------------------
// RedbActivationStore
// ---------------------------------------------------------------------------

pub struct RedbActivationStore {
    db: Database,
}

impl RedbActivationStore {
    /// Open or create the database at `path`, creating the table up front.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTIVE_RULES).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Run `write` inside one write transaction. Commits only when `write`
    /// succeeds and the deadline still holds; otherwise aborts. Waiting for
    /// the write lock is not interrupted by the deadline.
    fn in_write<T>(
        &self,
        deadline: &Deadline,
        operation: &str,
        write: impl FnOnce(&WriteTransaction) -> Result<T>,
    ) -> Result<T> {
        deadline.check(operation)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        match write(&wt).and_then(|value| deadline.check(operation).map(|()| value)) {
            Ok(value) => {
                wt.commit().map_err(store_err)?;
                Ok(value)
            }
            Err(e) => {
                wt.abort().map_err(store_err)?;
                Err(e)
            }
        }
    }
}

impl ActivationStore for RedbActivationStore {
    fn get(
        &self,
        key: &ActiveRuleKey,
        deadline: &Deadline,
    ) -> Result<Option<Versioned<ActiveRule>>> {
        deadline.check("store.get")?;
        let k = row_key(key)?;
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIVE_RULES).map_err(store_err)?;
        let row = table.get(k.as_slice()).map_err(store_err)?;
        row.map(|guard| decode(guard.value())).transpose()
    }

    fn put(&self, rule: &ActiveRule, expected: Option<u64>, deadline: &Deadline) -> Result<u64> {
        let k = row_key(&rule.key)?;
        self.in_write(deadline, "store.put", |wt| {
            let mut table = wt.open_table(ACTIVE_RULES).map_err(store_err)?;
            let current = match table.get(k.as_slice()).map_err(store_err)? {
                Some(guard) => Some(decode(guard.value())?.version),
                None => None,
            };
            check_version(&rule.key, current, expected)?;
            let version = current.unwrap_or(0) + 1;
            let value = serde_json::to_vec(&Versioned {
                version,
                value: rule,
            })
            .map_err(store_err)?;
            table
                .insert(k.as_slice(), value.as_slice())
                .map_err(store_err)?;
            Ok(version)
        })
    }

    fn remove(&self, key: &ActiveRuleKey, expected: u64, deadline: &Deadline) -> Result<()> {
        let k = row_key(key)?;
        self.in_write(deadline, "store.remove", |wt| {
            let mut table = wt.open_table(ACTIVE_RULES).map_err(store_err)?;
            let current = match table.get(k.as_slice()).map_err(store_err)? {
                Some(guard) => Some(decode(guard.value())?.version),
                None => None,
            };
            check_version(key, current, Some(expected))?;
            table.remove(k.as_slice()).map_err(store_err)?;
            Ok(())
        })
    }

    fn list_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>> {
        deadline.check("store.list_by_profile")?;
        let start = profile_prefix(profile)?;
        let end = profile_prefix_end(profile)?;
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIVE_RULES).map_err(store_err)?;

        let mut rules = Vec::new();
        for entry in table
            .range(start.as_slice()..end.as_slice())
            .map_err(store_err)?
        {
            let (_, v) = entry.map_err(store_err)?;
            rules.push(decode(v.value())?.value);
        }
        // Byte order of the key suffix is not RuleKey order in general
        rules.sort_by(|a, b| a.key.rule.cmp(&b.key.rule));
        Ok(rules)
    }

    fn profile_counts(&self, deadline: &Deadline) -> Result<BTreeMap<QualityProfileKey, usize>> {
        deadline.check("store.profile_counts")?;
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIVE_RULES).map_err(store_err)?;

        let mut counts = BTreeMap::new();
        for entry in table.iter().map_err(store_err)? {
            let (_, v) = entry.map_err(store_err)?;
            let rule = decode(v.value())?.value;
            *counts.entry(rule.key.profile).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
