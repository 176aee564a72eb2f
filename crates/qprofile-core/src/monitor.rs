//! Attributes exposed for external health polling.
//!
//! The engine does not push metrics. A poller asks [`ActiveRuleMonitor`] for
//! its attributes; each poll opens a connection from the factory, reads, and
//! releases it when the connection is dropped, on success and on error.

use crate::deadline::Deadline;
use crate::error::Result;
use crate::store::ActivationStore;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// EngineStats
// ---------------------------------------------------------------------------

/// Counters shared between the engine and the monitor.
#[derive(Debug, Default)]
pub struct EngineStats {
    stale_index_events: AtomicU64,
    /// Milliseconds since the epoch; 0 means never.
    last_reconciliation_ms: AtomicI64,
}

impl EngineStats {
    pub fn record_stale_index(&self) {
        self.stale_index_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconciliation(&self, at: DateTime<Utc>) {
        self.last_reconciliation_ms
            .store(at.timestamp_millis().max(1), Ordering::Relaxed);
    }

    pub fn stale_index_events(&self) -> u64 {
        self.stale_index_events.load(Ordering::Relaxed)
    }

    pub fn last_reconciliation(&self) -> Option<DateTime<Utc>> {
        match self.last_reconciliation_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

pub trait MonitorConnection {
    fn system_state(&self) -> Result<BTreeMap<String, Value>>;
}

pub trait MonitorConnectionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn MonitorConnection + '_>>;
}

/// Reads attributes straight from the activation store.
pub struct StoreConnectionFactory {
    store: Arc<dyn ActivationStore>,
    stats: Arc<EngineStats>,
    timeout: Duration,
    open_connections: AtomicUsize,
}

impl StoreConnectionFactory {
    pub fn new(store: Arc<dyn ActivationStore>, stats: Arc<EngineStats>, timeout: Duration) -> Self {
        Self {
            store,
            stats,
            timeout,
            open_connections: AtomicUsize::new(0),
        }
    }

    /// Connections handed out and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }
}

struct StoreConnection<'a> {
    factory: &'a StoreConnectionFactory,
    deadline: Deadline,
}

impl MonitorConnectionFactory for StoreConnectionFactory {
    fn open(&self) -> Result<Box<dyn MonitorConnection + '_>> {
        self.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StoreConnection {
            factory: self,
            deadline: Deadline::after(self.timeout),
        }))
    }
}

impl MonitorConnection for StoreConnection<'_> {
    fn system_state(&self) -> Result<BTreeMap<String, Value>> {
        let counts = self.factory.store.profile_counts(&self.deadline)?;
        let total: usize = counts.values().sum();
        let per_profile: serde_json::Map<String, Value> = counts
            .into_iter()
            .map(|(profile, n)| (profile.to_string(), Value::from(n)))
            .collect();

        let stats = &self.factory.stats;
        let mut attrs = BTreeMap::new();
        attrs.insert("Active Rules".to_string(), Value::from(total));
        attrs.insert(
            "Active Rules By Profile".to_string(),
            Value::Object(per_profile),
        );
        attrs.insert(
            "Last Reconciliation".to_string(),
            stats
                .last_reconciliation()
                .map_or(Value::Null, |at| Value::from(at.to_rfc3339())),
        );
        attrs.insert(
            "Stale Index Events".to_string(),
            Value::from(stats.stale_index_events()),
        );
        Ok(attrs)
    }
}

impl Drop for StoreConnection<'_> {
    fn drop(&mut self) {
        self.factory.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// ActiveRuleMonitor
// ---------------------------------------------------------------------------

pub struct ActiveRuleMonitor {
    factory: Arc<dyn MonitorConnectionFactory>,
}

impl ActiveRuleMonitor {
    pub fn new(factory: Arc<dyn MonitorConnectionFactory>) -> Self {
        Self { factory }
    }

    pub fn name(&self) -> &'static str {
        "Quality Profiles"
    }

    pub fn attributes(&self) -> Result<BTreeMap<String, Value>> {
        let connection = self.factory.open()?;
        connection.system_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QProfileError;
    use crate::store::{MemoryActivationStore, Versioned};
    use crate::types::{ActiveRule, ActiveRuleKey, Inheritance, QualityProfileKey, RuleKey, Severity};

    struct BrokenStore;

    impl ActivationStore for BrokenStore {
        fn get(&self, _: &ActiveRuleKey, _: &Deadline) -> Result<Option<Versioned<ActiveRule>>> {
            Ok(None)
        }
        fn put(&self, _: &ActiveRule, _: Option<u64>, _: &Deadline) -> Result<u64> {
            Ok(1)
        }
        fn remove(&self, _: &ActiveRuleKey, _: u64, _: &Deadline) -> Result<()> {
            Ok(())
        }
        fn list_by_profile(&self, _: &QualityProfileKey, _: &Deadline) -> Result<Vec<ActiveRule>> {
            Ok(vec![])
        }
        fn profile_counts(&self, _: &Deadline) -> Result<BTreeMap<QualityProfileKey, usize>> {
            Err(QProfileError::Store("disk unavailable".into()))
        }
    }

    #[test]
    fn attributes_count_rules_per_profile() {
        let store = Arc::new(MemoryActivationStore::new());
        let d = Deadline::unbounded();
        for name in ["a", "a", "b"] {
            let n = store.profile_counts(&d).unwrap().values().sum::<usize>();
            let rule = ActiveRule::new(
                ActiveRuleKey::new(
                    QualityProfileKey::new(name, "java"),
                    RuleKey::new("squid", format!("S{n}")),
                ),
                Severity::Major,
                BTreeMap::new(),
                Inheritance::Own,
            );
            store.put(&rule, None, &d).unwrap();
        }
        let stats = Arc::new(EngineStats::default());
        let factory = Arc::new(StoreConnectionFactory::new(
            store,
            Arc::clone(&stats),
            Duration::from_secs(1),
        ));
        let monitor = ActiveRuleMonitor::new(factory.clone());

        let attrs = monitor.attributes().unwrap();
        assert_eq!(attrs["Active Rules"], Value::from(3));
        assert_eq!(attrs["Active Rules By Profile"]["java:a"], Value::from(2));
        assert_eq!(attrs["Last Reconciliation"], Value::Null);
        assert_eq!(factory.open_connections(), 0);

        stats.record_reconciliation(Utc::now());
        stats.record_stale_index();
        let attrs = monitor.attributes().unwrap();
        assert!(attrs["Last Reconciliation"].is_string());
        assert_eq!(attrs["Stale Index Events"], Value::from(1));
    }

    #[test]
    fn connection_is_released_when_poll_fails() {
        let factory = Arc::new(StoreConnectionFactory::new(
            Arc::new(BrokenStore),
            Arc::new(EngineStats::default()),
            Duration::from_secs(1),
        ));
        let monitor = ActiveRuleMonitor::new(factory.clone());
        assert!(monitor.attributes().is_err());
        assert_eq!(factory.open_connections(), 0);
    }
}
