use qprofile_core::catalog::{MemoryRuleCatalog, ParamType, RuleDefinition, RuleQuery};
use qprofile_core::config::EngineConfig;
use qprofile_core::deadline::Deadline;
use qprofile_core::index::{ActiveRuleCriteria, ActiveRuleIndex, ActiveRuleKeys, MemoryActiveRuleIndex};
use qprofile_core::profile::{MemoryProfileRegistry, ProfileRegistry, QualityProfile};
use qprofile_core::session::StaticSession;
use qprofile_core::store::{ActivationStore, MemoryActivationStore, Versioned};
use qprofile_core::{
    ActiveRule, ActiveRuleKey, BulkActivation, BulkOutcome, ChangeKind, Inheritance,
    QProfileError, QProfileService, QualityProfileKey, RequestContext, Result, RuleActivation,
    RuleKey, Severity,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Index that can be switched to reject writes.
#[derive(Default)]
struct FlakyIndex {
    inner: MemoryActiveRuleIndex,
    offline: AtomicBool,
}

impl FlakyIndex {
    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(QProfileError::Index("index offline".into()));
        }
        Ok(())
    }
}

impl ActiveRuleIndex for FlakyIndex {
    fn upsert(&self, rule: &ActiveRule, deadline: &Deadline) -> Result<()> {
        self.check()?;
        self.inner.upsert(rule, deadline)
    }
    fn delete(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<()> {
        self.check()?;
        self.inner.delete(key, deadline)
    }
    fn get_by_key(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<Option<ActiveRule>> {
        self.inner.get_by_key(key, deadline)
    }
    fn find_by_rule(&self, rule: &RuleKey, deadline: &Deadline) -> Result<Vec<ActiveRule>> {
        self.inner.find_by_rule(rule, deadline)
    }
    fn find_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>> {
        self.inner.find_by_profile(profile, deadline)
    }
    fn query(&self, criteria: &ActiveRuleCriteria, deadline: &Deadline) -> Result<ActiveRuleKeys> {
        self.inner.query(criteria, deadline)
    }
    fn replace_profile(
        &self,
        profile: &QualityProfileKey,
        rules: &[ActiveRule],
        deadline: &Deadline,
    ) -> Result<()> {
        self.inner.replace_profile(profile, rules, deadline)
    }
}

/// Store whose next write to one chosen key fails with `Conflict`.
#[derive(Default)]
struct FailOnceStore {
    inner: MemoryActivationStore,
    fail_on: Mutex<Option<ActiveRuleKey>>,
}

impl FailOnceStore {
    fn fail_next_write_to(&self, key: ActiveRuleKey) {
        *self.fail_on.lock().unwrap() = Some(key);
    }

    fn trip(&self, key: &ActiveRuleKey) -> Result<()> {
        let mut fail_on = self.fail_on.lock().unwrap();
        if fail_on.as_ref() == Some(key) {
            *fail_on = None;
            return Err(QProfileError::Conflict(format!("{key} busy")));
        }
        Ok(())
    }
}

impl ActivationStore for FailOnceStore {
    fn get(&self, key: &ActiveRuleKey, deadline: &Deadline) -> Result<Option<Versioned<ActiveRule>>> {
        self.inner.get(key, deadline)
    }
    fn put(&self, rule: &ActiveRule, expected: Option<u64>, deadline: &Deadline) -> Result<u64> {
        self.trip(&rule.key)?;
        self.inner.put(rule, expected, deadline)
    }
    fn remove(&self, key: &ActiveRuleKey, expected: u64, deadline: &Deadline) -> Result<()> {
        self.trip(key)?;
        self.inner.remove(key, expected, deadline)
    }
    fn list_by_profile(
        &self,
        profile: &QualityProfileKey,
        deadline: &Deadline,
    ) -> Result<Vec<ActiveRule>> {
        self.inner.list_by_profile(profile, deadline)
    }
    fn profile_counts(&self, deadline: &Deadline) -> Result<BTreeMap<QualityProfileKey, usize>> {
        self.inner.profile_counts(deadline)
    }
}

struct Engine {
    service: QProfileService,
    store: Arc<FailOnceStore>,
    index: Arc<FlakyIndex>,
}

fn pk(name: &str) -> QualityProfileKey {
    QualityProfileKey::new(name, "java")
}

fn rk(rule: &str) -> RuleKey {
    RuleKey::new("squid", rule)
}

fn ark(profile: &str, rule: &str) -> ActiveRuleKey {
    ActiveRuleKey::new(pk(profile), rk(rule))
}

fn catalog() -> MemoryRuleCatalog {
    let mut rules = vec![
        RuleDefinition::new(rk("A"), "Cyclomatic complexity", "java")
            .with_param("max", ParamType::Integer, Some("10")),
        RuleDefinition::new(rk("B"), "Line length", "java")
            .with_param("max", ParamType::Integer, Some("120")),
        RuleDefinition::new(rk("C"), "Empty catch block", "java").with_severity(Severity::Critical),
        RuleDefinition::new(RuleKey::new("pylint", "W0611"), "Unused import", "py"),
    ];
    for i in 1..=5 {
        // Rule 3 declares a boolean "max" so an integer value is rejected
        let param_type = if i == 3 { ParamType::Boolean } else { ParamType::Integer };
        rules.push(
            RuleDefinition::new(RuleKey::new("bulk", format!("R{i}")), "Bulk rule", "java")
                .with_param("max", param_type, None)
                .with_tags(&["bulk"]),
        );
    }
    MemoryRuleCatalog::new(rules)
}

fn engine() -> Engine {
    let profiles = MemoryProfileRegistry::new();
    profiles.create(QualityProfile::new(pk("Sonar way"))).unwrap();
    profiles.create(QualityProfile::new(pk("parent"))).unwrap();
    profiles
        .create(QualityProfile::new(pk("child")).with_parent(pk("parent")))
        .unwrap();
    let store = Arc::new(FailOnceStore::default());
    let index = Arc::new(FlakyIndex::default());
    let service = QProfileService::new(
        store.clone(),
        index.clone(),
        Arc::new(catalog()),
        Arc::new(profiles),
        &EngineConfig::default(),
    );
    Engine {
        service,
        store,
        index,
    }
}

fn admin() -> StaticSession {
    StaticSession::admin("admin")
}

fn ctx(session: &StaticSession) -> RequestContext<'_> {
    RequestContext::new(session, Duration::from_secs(5))
}

fn activate(e: &Engine, profile: &str, rule: &str, severity: Severity) -> Vec<ChangeKind> {
    let session = admin();
    e.service
        .activate(
            &ctx(&session),
            &RuleActivation::new(ark(profile, rule)).with_severity(severity),
        )
        .unwrap()
        .iter()
        .map(|c| c.kind())
        .collect()
}

fn stored(e: &Engine, key: &ActiveRuleKey) -> Option<ActiveRule> {
    e.store
        .get(key, &Deadline::unbounded())
        .unwrap()
        .map(|v| v.value)
}

fn backup_yaml(e: &Engine, profile: &str) -> Vec<u8> {
    let session = StaticSession::anonymous();
    let mut buf = Vec::new();
    e.service.backup(&ctx(&session), &pk(profile), &mut buf).unwrap();
    buf
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[test]
fn activation_is_idempotent() {
    let e = engine();
    assert_eq!(activate(&e, "Sonar way", "A", Severity::Major), vec![ChangeKind::Activated]);
    assert!(activate(&e, "Sonar way", "A", Severity::Major).is_empty());
    assert_eq!(activate(&e, "Sonar way", "A", Severity::Minor), vec![ChangeKind::Updated]);
}

#[test]
fn concurrent_activations_leave_one_binding() {
    let e = Arc::new(engine());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let e = Arc::clone(&e);
            std::thread::spawn(move || {
                let session = admin();
                let severity = if i % 2 == 0 { Severity::Major } else { Severity::Blocker };
                e.service.activate(
                    &ctx(&session),
                    &RuleActivation::new(ark("Sonar way", "A")).with_severity(severity),
                )
            })
        })
        .collect();
    for h in handles {
        match h.join().unwrap() {
            Ok(_) => {}
            Err(err) => assert!(err.is_retryable(), "unexpected error: {err}"),
        }
    }
    let counts = e.store.profile_counts(&Deadline::unbounded()).unwrap();
    assert_eq!(counts[&pk("Sonar way")], 1);
    let session = admin();
    let indexed = e
        .service
        .find_active_rules_by_rule(&ctx(&session), &rk("A"))
        .unwrap();
    assert_eq!(indexed.len(), 1);
}

#[test]
fn index_failure_reports_stale_but_keeps_store_write() {
    let e = engine();
    e.index.offline.store(true, Ordering::SeqCst);
    let session = admin();
    let err = e
        .service
        .activate(&ctx(&session), &RuleActivation::new(ark("Sonar way", "A")))
        .unwrap_err();
    match err {
        QProfileError::IndexStale { changes, .. } => {
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].kind(), ChangeKind::Activated);
        }
        other => panic!("expected IndexStale, got {other}"),
    }
    assert!(stored(&e, &ark("Sonar way", "A")).is_some());
    assert_eq!(e.service.stats().stale_index_events(), 1);

    e.index.offline.store(false, Ordering::SeqCst);
    assert_eq!(e.service.resync_index(&ctx(&session), &pk("Sonar way")).unwrap(), 1);
    assert!(e
        .service
        .get_active_rule(&ctx(&session), &ark("Sonar way", "A"))
        .unwrap()
        .is_some());
}

#[test]
fn expired_deadline_times_out() {
    let e = engine();
    let session = admin();
    let err = e
        .service
        .activate(
            &RequestContext::new(&session, Duration::ZERO),
            &RuleActivation::new(ark("Sonar way", "A")),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert!(stored(&e, &ark("Sonar way", "A")).is_none());
}

#[test]
fn retrying_an_interrupted_activation_completes_the_cascade() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    e.store.fail_next_write_to(ark("child", "A"));

    let session = admin();
    let louder = RuleActivation::new(ark("parent", "A")).with_severity(Severity::Blocker);
    let err = e.service.activate(&ctx(&session), &louder).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.applied_changes().len(), 1);
    assert_eq!(stored(&e, &ark("child", "A")).unwrap().severity, Severity::Major);

    let changes = e.service.activate(&ctx(&session), &louder).unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].key(), &ark("child", "A"));
    let child = stored(&e, &ark("child", "A")).unwrap();
    assert_eq!(child.severity, Severity::Blocker);
    assert_eq!(child.inheritance, Inheritance::Inherited);
}

// ---------------------------------------------------------------------------
// Inheritance
// ---------------------------------------------------------------------------

#[test]
fn override_survives_parent_deactivation() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    let child = stored(&e, &ark("child", "A")).unwrap();
    assert_eq!(child.inheritance, Inheritance::Inherited);
    assert_eq!(child.severity, Severity::Major);

    activate(&e, "child", "A", Severity::Critical);
    assert_eq!(stored(&e, &ark("child", "A")).unwrap().inheritance, Inheritance::Overridden);

    let session = admin();
    let changes = e.service.deactivate(&ctx(&session), &ark("parent", "A")).unwrap();
    assert_eq!(changes.len(), 2);
    let child = stored(&e, &ark("child", "A")).unwrap();
    assert_eq!(child.severity, Severity::Critical);
    assert_eq!(child.inheritance, Inheritance::Own);
}

#[test]
fn create_profile_with_parent_inherits_its_rules() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    activate(&e, "parent", "C", Severity::Info);
    let session = admin();
    let changes = e
        .service
        .create_profile(&ctx(&session), &pk("team"), Some(pk("parent")))
        .unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(stored(&e, &ark("team", "C")).unwrap().inheritance, Inheritance::Inherited);

    let err = e
        .service
        .create_profile(&ctx(&session), &pk("team"), None)
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    let err = e
        .service
        .create_profile(
            &ctx(&session),
            &QualityProfileKey::new("py team", "py"),
            Some(pk("parent")),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_activation");
}

#[test]
fn repeating_an_interrupted_create_finishes_inheritance() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    activate(&e, "parent", "C", Severity::Info);
    e.store.fail_next_write_to(ark("team", "C"));

    let session = admin();
    let err = e
        .service
        .create_profile(&ctx(&session), &pk("team"), Some(pk("parent")))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    assert_eq!(err.applied_changes().len(), 1);
    assert!(stored(&e, &ark("team", "C")).is_none());

    let changes = e
        .service
        .create_profile(&ctx(&session), &pk("team"), Some(pk("parent")))
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(stored(&e, &ark("team", "C")).unwrap().inheritance, Inheritance::Inherited);

    let err = e
        .service
        .create_profile(&ctx(&session), &pk("team"), Some(pk("parent")))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
}

// ---------------------------------------------------------------------------
// Backup / restore
// ---------------------------------------------------------------------------

#[test]
fn restore_of_own_backup_changes_nothing() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    activate(&e, "Sonar way", "C", Severity::Blocker);
    let yaml = backup_yaml(&e, "Sonar way");

    let session = admin();
    let changes = e
        .service
        .restore(&ctx(&session), yaml.as_slice(), &pk("Sonar way"))
        .unwrap();
    assert!(changes.is_empty());
}

#[test]
fn restore_applies_the_difference() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    activate(&e, "Sonar way", "B", Severity::Minor);
    let doc = "rules:\n  - rule_key: squid:A\n    severity: MAJOR\n  - rule_key: squid:C\n    severity: CRITICAL\n";

    let session = admin();
    let changes = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("Sonar way"))
        .unwrap();
    let summary: Vec<(ChangeKind, String)> = changes
        .iter()
        .map(|c| (c.kind(), c.key().rule.to_string()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ChangeKind::Deactivated, "squid:B".to_string()),
            (ChangeKind::Activated, "squid:C".to_string()),
        ]
    );
}

#[test]
fn interrupted_restore_reports_applied_changes_and_finishes_on_repeat() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    activate(&e, "Sonar way", "B", Severity::Minor);
    let doc = "rules:\n  - rule_key: squid:A\n    severity: MAJOR\n  - rule_key: squid:C\n    severity: CRITICAL\n";
    e.store.fail_next_write_to(ark("Sonar way", "C"));

    let session = admin();
    let err = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("Sonar way"))
        .unwrap_err();
    assert_eq!(err.kind(), "conflict");
    let applied = err.applied_changes();
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].kind(), ChangeKind::Deactivated);
    assert_eq!(applied[0].key(), &ark("Sonar way", "B"));
    assert!(stored(&e, &ark("Sonar way", "C")).is_none());

    let changes = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("Sonar way"))
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind(), ChangeKind::Activated);
    assert_eq!(changes[0].key(), &ark("Sonar way", "C"));
}

#[test]
fn restore_with_index_offline_applies_everything_then_reports_stale() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    activate(&e, "Sonar way", "B", Severity::Minor);
    let doc = "rules:\n  - rule_key: squid:A\n    severity: MAJOR\n  - rule_key: squid:C\n    severity: CRITICAL\n";
    e.index.offline.store(true, Ordering::SeqCst);

    let session = admin();
    let err = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("Sonar way"))
        .unwrap_err();
    match err {
        QProfileError::IndexStale { changes, .. } => {
            let summary: Vec<(ChangeKind, String)> = changes
                .iter()
                .map(|c| (c.kind(), c.key().rule.to_string()))
                .collect();
            assert_eq!(
                summary,
                vec![
                    (ChangeKind::Deactivated, "squid:B".to_string()),
                    (ChangeKind::Activated, "squid:C".to_string()),
                ]
            );
        }
        other => panic!("expected IndexStale, got {other}"),
    }
    assert!(stored(&e, &ark("Sonar way", "B")).is_none());
    assert!(stored(&e, &ark("Sonar way", "C")).is_some());
    assert_eq!(e.service.stats().stale_index_events(), 2);

    e.index.offline.store(false, Ordering::SeqCst);
    e.service.resync_index(&ctx(&session), &pk("Sonar way")).unwrap();
    let yaml = String::from_utf8(backup_yaml(&e, "Sonar way")).unwrap();
    assert!(yaml.contains("squid:C"), "{yaml}");
    assert!(!yaml.contains("squid:B"), "{yaml}");
}

#[test]
fn restore_reports_every_problem_and_changes_nothing() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    let doc = "\
rules:
  - rule_key: not-a-key
    severity: MAJOR
  - rule_key: squid:nope
    severity: MAJOR
  - rule_key: squid:B
    severity: URGENT
  - rule_key: squid:A
    severity: MAJOR
    params: { max: ten }
";
    let session = admin();
    let err = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("Sonar way"))
        .unwrap_err();
    match err {
        QProfileError::MalformedBackup(problems) => assert_eq!(problems.len(), 4, "{problems:?}"),
        other => panic!("expected MalformedBackup, got {other}"),
    }
    assert_eq!(stored(&e, &ark("Sonar way", "A")).unwrap().params["max"], "10");
}

#[test]
fn restore_leaves_inherited_bindings_alone() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    let doc = "rules:\n  - rule_key: squid:C\n    severity: MINOR\n";
    let session = admin();
    let changes = e
        .service
        .restore(&ctx(&session), doc.as_bytes(), &pk("child"))
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert!(stored(&e, &ark("child", "A")).is_some());
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

#[test]
fn mutations_require_admin_and_reads_do_not() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    let yaml = backup_yaml(&e, "Sonar way");

    for session in [StaticSession::anonymous(), StaticSession::logged_in("dev")] {
        let c = ctx(&session);
        let s = &e.service;
        let results = vec![
            s.activate(&c, &RuleActivation::new(ark("Sonar way", "B"))).map(|_| ()),
            s.deactivate(&c, &ark("Sonar way", "A")).map(|_| ()),
            s.bulk_activate(&c, &BulkActivation::new(RuleQuery::default(), pk("Sonar way")))
                .map(|_| ()),
            s.bulk_deactivate(&c, &RuleQuery::default(), &pk("Sonar way"))
                .map(|_| ()),
            s.restore(&c, yaml.as_slice(), &pk("Sonar way")).map(|_| ()),
            s.create_profile(&c, &pk("new"), None).map(|_| ()),
            s.set_parent(&c, &pk("Sonar way"), Some(pk("parent"))).map(|_| ()),
            s.resync_index(&c, &pk("Sonar way")).map(|_| ()),
        ];
        for result in results {
            assert_eq!(result.unwrap_err().kind(), "permission");
        }

        assert!(s.get_active_rule(&c, &ark("Sonar way", "A")).unwrap().is_some());
        assert_eq!(s.find_active_rules_by_profile(&c, &pk("Sonar way")).unwrap().len(), 1);
        assert_eq!(s.list_profiles(&c).len(), 3);
        let mut buf = Vec::new();
        s.backup(&c, &pk("Sonar way"), &mut buf).unwrap();
    }
    let counts = e.store.profile_counts(&Deadline::unbounded()).unwrap();
    assert_eq!(counts.values().sum::<usize>(), 1);
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

#[test]
fn bulk_activation_reports_partial_failure() {
    let e = engine();
    let session = admin();
    let mut request = BulkActivation::new(RuleQuery::default().tag("bulk"), pk("Sonar way"))
        .with_severity(Severity::Minor);
    request.params = BTreeMap::from([("max".to_string(), "5".to_string())]);

    let report = e.service.bulk_activate(&ctx(&session), &request).unwrap();
    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 1);
    match &report.outcomes[&RuleKey::new("bulk", "R3")] {
        BulkOutcome::Failed { kind, .. } => assert_eq!(kind, "invalid_parameter"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(report.changes().count(), 4);
    let keys: Vec<String> = report.outcomes.keys().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["bulk:R1", "bulk:R2", "bulk:R3", "bulk:R4", "bulk:R5"]);
}

#[test]
fn bulk_with_index_offline_marks_outcomes_stale() {
    let e = engine();
    e.index.offline.store(true, Ordering::SeqCst);
    let session = admin();
    let report = e
        .service
        .bulk_activate(
            &ctx(&session),
            &BulkActivation::new(RuleQuery::default().tag("bulk"), pk("Sonar way")),
        )
        .unwrap();
    assert_eq!(report.succeeded(), 5);
    assert_eq!(report.stale(), 5);
    assert_eq!(report.changes().count(), 5);
    assert!(report.outcomes.values().all(|o| matches!(
        o,
        BulkOutcome::Succeeded {
            index_stale: true,
            ..
        }
    )));
    assert!(stored(&e, &ActiveRuleKey::new(pk("Sonar way"), RuleKey::new("bulk", "R3"))).is_some());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcomes"]["bulk:R1"]["index_stale"], true);
}

#[test]
fn bulk_deactivate_filters_on_active_severity() {
    let e = engine();
    activate(&e, "Sonar way", "A", Severity::Major);
    activate(&e, "Sonar way", "B", Severity::Minor);
    activate(&e, "Sonar way", "C", Severity::Major);
    let session = admin();
    let report = e
        .service
        .bulk_deactivate(
            &ctx(&session),
            &RuleQuery::default().severity(Severity::Major),
            &pk("Sonar way"),
        )
        .unwrap();
    assert_eq!(report.succeeded(), 2);
    assert!(stored(&e, &ark("Sonar way", "B")).is_some());
    assert!(stored(&e, &ark("Sonar way", "A")).is_none());
}

#[test]
fn bulk_on_unknown_profile_fails_before_any_work() {
    let e = engine();
    let session = admin();
    let err = e
        .service
        .bulk_activate(
            &ctx(&session),
            &BulkActivation::new(RuleQuery::default(), pk("ghost")),
        )
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[test]
fn bulk_with_expired_deadline_marks_every_rule_timed_out() {
    let e = engine();
    let session = admin();
    let report = e
        .service
        .bulk_activate(
            &RequestContext::new(&session, Duration::ZERO),
            &BulkActivation::new(RuleQuery::default().tag("bulk"), pk("Sonar way")),
        )
        .unwrap();
    assert_eq!(report.failed(), 5);
    assert!(report
        .outcomes
        .values()
        .all(|o| matches!(o, BulkOutcome::Failed { kind, .. } if kind == "timeout")));
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

#[test]
fn monitor_reports_active_rule_totals() {
    let e = engine();
    activate(&e, "parent", "A", Severity::Major);
    let monitor = e.service.monitor();
    assert_eq!(monitor.name(), "Quality Profiles");
    let attrs = monitor.attributes().unwrap();
    assert_eq!(attrs["Active Rules"], serde_json::json!(2));
    assert_eq!(attrs["Active Rules By Profile"]["java:child"], serde_json::json!(1));
}
