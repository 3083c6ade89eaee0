use crate::dedup::{plan, DedupAction, DedupConfig, DedupEngine};
use crate::grouping::AlertGrouper;
use crate::inhibition::InhibitionEngine;
use crate::routing::RoutingEngine;
use crate::silence::SilenceEngine;
use crate::AlertError;
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use vigil_common::channel::NotificationChannel;
use vigil_common::metrics::InMemoryMetrics;
use vigil_common::rules::{InhibitionRule, Receiver, RoutingRule, Silence};
use vigil_common::{
    Alert, AlertStatus, Fingerprint, IncomingAlert, Labels, MatcherSet, Severity,
};
use vigil_storage::history::HistoryKind;
use vigil_storage::{AlertRepository, MemoryHistory, MemoryStore, StorageError};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn high_cpu() -> Labels {
    labels(&[("alertname", "HighCPU"), ("instance", "web-01")])
}

fn engine(store: Arc<MemoryStore>) -> DedupEngine {
    DedupEngine::new(store, DedupConfig::default())
}

fn alert_at(pairs: &[(&str, &str)], severity: Severity, now: DateTime<Utc>) -> Alert {
    Alert::from_incoming(&IncomingAlert::firing(labels(pairs), severity), now)
}

// --- deduplication ---

#[test]
fn high_cpu_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let t0 = Utc::now();

    let created = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), t0)
        .unwrap();
    assert_eq!(created.action, DedupAction::Create);
    assert!(created.notify);
    assert!(!created.duplicate);

    let again = engine
        .process(
            &IncomingAlert::firing(high_cpu(), Severity::Warning),
            t0 + Duration::seconds(30),
        )
        .unwrap();
    assert_eq!(again.action, DedupAction::Refresh);
    assert!(again.duplicate);
    assert!(!again.notify);

    let raised = engine
        .process(
            &IncomingAlert::firing(high_cpu(), Severity::Critical),
            t0 + Duration::seconds(60),
        )
        .unwrap();
    assert_eq!(raised.action, DedupAction::UpdateSeverity);
    assert!(raised.notify);
    let alert = raised.alert.unwrap();
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.status, AlertStatus::Firing);

    // A lower severity does not lower the stored one
    let lower = engine
        .process(
            &IncomingAlert::firing(high_cpu(), Severity::Info),
            t0 + Duration::seconds(90),
        )
        .unwrap();
    assert_eq!(lower.action, DedupAction::Refresh);
    assert_eq!(lower.alert.unwrap().severity, Severity::Critical);

    let resolved = engine
        .process(&IncomingAlert::resolved(high_cpu()), t0 + Duration::seconds(120))
        .unwrap();
    assert_eq!(resolved.action, DedupAction::UpdateStatus);
    let alert = resolved.alert.unwrap();
    assert_eq!(alert.status, AlertStatus::Resolved);
    assert_eq!(alert.ends_at, Some(t0 + Duration::seconds(120)));

    let resolved_twice = engine
        .process(&IncomingAlert::resolved(high_cpu()), t0 + Duration::seconds(150))
        .unwrap();
    assert_eq!(resolved_twice.action, DedupAction::Ignore);
    assert!(resolved_twice.duplicate);
    assert!(!resolved_twice.notify);

    let reopened = engine
        .process(
            &IncomingAlert::firing(high_cpu(), Severity::Warning),
            t0 + Duration::seconds(180),
        )
        .unwrap();
    assert_eq!(reopened.action, DedupAction::Reopen);
    assert!(reopened.notify);
    let alert = reopened.alert.unwrap();
    assert_eq!(alert.occurrences, 2);
    assert_eq!(alert.starts_at, t0 + Duration::seconds(180));
    assert_eq!(alert.ends_at, None);
    assert_eq!(alert.severity, Severity::Warning);

    assert_eq!(store.alert_count(), 1);
}

#[test]
fn resolved_event_for_unknown_alert_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let outcome = engine(store.clone())
        .process(&IncomingAlert::resolved(high_cpu()), Utc::now())
        .unwrap();
    assert_eq!(outcome.action, DedupAction::Ignore);
    assert!(outcome.alert.is_none());
    assert_eq!(store.alert_count(), 0);
}

#[test]
fn invalid_event_never_touches_state() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());

    let missing_name = IncomingAlert::firing(labels(&[("instance", "a")]), Severity::Info);
    assert!(matches!(
        engine.process(&missing_name, Utc::now()),
        Err(AlertError::Validation(_))
    ));

    let empty = IncomingAlert::firing(Labels::new(), Severity::Info);
    assert!(engine.process(&empty, Utc::now()).is_err());
    assert_eq!(store.alert_count(), 0);
}

#[test]
fn refresh_after_quiet_window_is_a_repeat() {
    let t0 = Utc::now();
    let event = IncomingAlert::firing(high_cpu(), Severity::Warning);
    let stored = Alert::from_incoming(&event, t0);
    let window = Duration::minutes(5);

    let soon = plan(Some(&stored), &event, t0 + Duration::minutes(1), window);
    assert_eq!(soon.action, DedupAction::Refresh);
    assert!(!soon.repeat);

    let later = plan(Some(&stored), &event, t0 + Duration::minutes(6), window);
    assert_eq!(later.action, DedupAction::Refresh);
    assert!(later.repeat);
    assert_eq!(later.next.unwrap().updated_at, t0 + Duration::minutes(6));
}

#[test]
fn acknowledged_alert_keeps_deduplicating() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone());
    let now = Utc::now();
    let outcome = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), now)
        .unwrap();

    let acked = engine.acknowledge(&outcome.fingerprint, now).unwrap();
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(store.list_firing().unwrap().len(), 1);

    let refresh = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), now)
        .unwrap();
    assert_eq!(refresh.action, DedupAction::Refresh);
    assert_eq!(refresh.alert.unwrap().status, AlertStatus::Acknowledged);

    // Acknowledging twice is refused
    assert!(matches!(
        engine.acknowledge(&outcome.fingerprint, now),
        Err(AlertError::InvalidTransition { .. })
    ));
    assert!(matches!(
        engine.acknowledge(&Fingerprint::from("nope".to_string()), now),
        Err(AlertError::NotFound(_))
    ));
}

#[test]
fn state_changes_are_recorded_and_counted() {
    let store = Arc::new(MemoryStore::new());
    let history = Arc::new(MemoryHistory::new(100));
    let metrics = Arc::new(InMemoryMetrics::new());
    let engine = DedupEngine::new(store, DedupConfig::default())
        .with_history(history.clone())
        .with_metrics(metrics.clone());
    let now = Utc::now();

    for event in [
        IncomingAlert::firing(high_cpu(), Severity::Warning),
        IncomingAlert::firing(high_cpu(), Severity::Warning),
        IncomingAlert::resolved(high_cpu()),
        IncomingAlert::resolved(high_cpu()),
    ] {
        engine.process(&event, now).unwrap();
    }

    assert_eq!(history.count(HistoryKind::Created), 1);
    assert_eq!(history.count(HistoryKind::Resolved), 1);
    assert_eq!(history.len(), 2);
    assert_eq!(metrics.get("dedup.create"), 1);
    assert_eq!(metrics.get("dedup.refresh"), 1);
    assert_eq!(metrics.get("dedup.ignore"), 1);
    assert_eq!(metrics.get("dedup.duplicates"), 2);
}

#[test]
fn concurrent_duplicates_create_exactly_one_alert() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine(store.clone()));
    let creates = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let creates = Arc::clone(&creates);
            thread::spawn(move || {
                let outcome = engine
                    .process(
                        &IncomingAlert::firing(high_cpu(), Severity::Warning),
                        Utc::now(),
                    )
                    .unwrap();
                if outcome.action == DedupAction::Create {
                    creates.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(creates.load(Ordering::SeqCst), 1);
    assert_eq!(store.alert_count(), 1);
    assert_eq!(store.list_alerts()[0].version, 8);
}

/// Wraps a store and injects version conflicts into the first upserts.
struct ConflictingStore {
    inner: MemoryStore,
    conflicts_left: AtomicUsize,
}

impl AlertRepository for ConflictingStore {
    fn get_by_fingerprint(&self, fp: &Fingerprint) -> vigil_storage::Result<Option<Alert>> {
        self.inner.get_by_fingerprint(fp)
    }

    fn upsert(&self, alert: &Alert) -> vigil_storage::Result<Alert> {
        let left = self.conflicts_left.load(Ordering::SeqCst);
        if left > 0 {
            self.conflicts_left.store(left - 1, Ordering::SeqCst);
            return Err(StorageError::VersionConflict {
                fingerprint: alert.fingerprint.to_string(),
                expected: alert.version,
                actual: alert.version + 1,
            });
        }
        self.inner.upsert(alert)
    }

    fn list_firing(&self) -> vigil_storage::Result<Vec<Alert>> {
        self.inner.list_firing()
    }

    fn list_active_silences(&self, now: DateTime<Utc>) -> vigil_storage::Result<Vec<Silence>> {
        self.inner.list_active_silences(now)
    }

    fn list_enabled_routing_rules(&self) -> vigil_storage::Result<Vec<RoutingRule>> {
        self.inner.list_enabled_routing_rules()
    }

    fn list_enabled_inhibition_rules(&self) -> vigil_storage::Result<Vec<InhibitionRule>> {
        self.inner.list_enabled_inhibition_rules()
    }

    fn get_channel(&self, id: &str) -> vigil_storage::Result<Option<NotificationChannel>> {
        self.inner.get_channel(id)
    }
}

#[test]
fn single_conflict_is_retried() {
    let store = Arc::new(ConflictingStore {
        inner: MemoryStore::new(),
        conflicts_left: AtomicUsize::new(1),
    });
    let engine = DedupEngine::new(store.clone(), DedupConfig::default());
    let outcome = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), Utc::now())
        .unwrap();
    assert_eq!(outcome.action, DedupAction::Create);
    assert_eq!(store.inner.alert_count(), 1);
}

#[test]
fn repeated_conflict_surfaces_as_transient_error() {
    let store = Arc::new(ConflictingStore {
        inner: MemoryStore::new(),
        conflicts_left: AtomicUsize::new(2),
    });
    let engine = DedupEngine::new(store.clone(), DedupConfig::default());
    let err = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), Utc::now())
        .unwrap_err();
    assert!(matches!(err, AlertError::Conflict { .. }));
    assert!(err.is_transient());
    assert_eq!(store.inner.alert_count(), 0);
}

// --- correlation ---

#[test]
fn alerts_sharing_instance_are_correlated() {
    let store = Arc::new(MemoryStore::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let engine = engine(store).with_metrics(metrics.clone());
    let now = Utc::now();

    let first = engine
        .process(&IncomingAlert::firing(high_cpu(), Severity::Warning), now)
        .unwrap();
    assert!(first.correlations.is_empty());

    let disk = labels(&[("alertname", "DiskFull"), ("instance", "web-01")]);
    let second = engine
        .process(
            &IncomingAlert::firing(disk, Severity::Warning),
            now + Duration::minutes(1),
        )
        .unwrap();
    assert_eq!(second.correlations.len(), 1);
    let signal = &second.correlations[0];
    assert_eq!(signal.label, "instance");
    assert_eq!(signal.value, "web-01");
    assert_eq!(signal.related, vec![first.fingerprint.clone()]);
    assert_eq!(metrics.get("correlated.instance"), 1);

    // Outside the window nothing correlates
    let mem = labels(&[("alertname", "HighMem"), ("instance", "web-01")]);
    let third = engine
        .process(
            &IncomingAlert::firing(mem, Severity::Warning),
            now + Duration::minutes(20),
        )
        .unwrap();
    assert!(third.correlations.is_empty());

    // Correlation never merges records
    assert_eq!(engine.compact(now + Duration::hours(1)), (0, 1));
}

// --- grouping ---

#[test]
fn grouper_tracks_members_until_last_resolves() {
    let grouper = AlertGrouper::new(vec!["instance".into()]);
    let now = Utc::now();
    let cpu = alert_at(&[("alertname", "HighCPU"), ("instance", "n1")], Severity::Warning, now);
    let disk = alert_at(&[("alertname", "DiskFull"), ("instance", "n1")], Severity::Critical, now);
    let other = alert_at(&[("alertname", "HighCPU")], Severity::Warning, now);

    assert!(grouper.observe(&other, now).is_none());
    grouper.observe(&cpu, now).unwrap();
    let group = grouper.observe(&disk, now).unwrap();
    assert_eq!(group.group_key, "instance=n1");
    assert_eq!(group.members.len(), 2);
    assert_eq!(group.severity, Severity::Critical);

    let mut resolved = disk.clone();
    resolved.status = AlertStatus::Resolved;
    let group = grouper.observe(&resolved, now).unwrap();
    assert_eq!(group.members.len(), 1);
    assert_eq!(group.severity, Severity::Warning);

    let mut resolved = cpu.clone();
    resolved.status = AlertStatus::Resolved;
    let closed = grouper.observe(&resolved, now).unwrap();
    assert_eq!(closed.status, AlertStatus::Resolved);
    assert!(grouper.get("instance=n1").is_none());
    assert!(grouper.groups().is_empty());
}

#[test]
fn grouper_ignores_older_versions_of_a_member() {
    let grouper = AlertGrouper::new(vec!["instance".into()]);
    let now = Utc::now();
    let mut cpu = alert_at(&[("alertname", "HighCPU"), ("instance", "n2")], Severity::Warning, now);
    let mut disk = alert_at(&[("alertname", "DiskFull"), ("instance", "n2")], Severity::Warning, now);
    cpu.version = 2;
    disk.version = 1;
    grouper.observe(&cpu, now).unwrap();
    grouper.observe(&disk, now).unwrap();

    let mut raised = cpu.clone();
    raised.version = 3;
    raised.severity = Severity::Critical;
    assert_eq!(grouper.observe(&raised, now).unwrap().severity, Severity::Critical);

    // A late writer still holding version 2 cannot roll the member back
    let group = grouper.observe(&cpu, now).unwrap();
    assert_eq!(group.severity, Severity::Critical);
    assert_eq!(group.members.len(), 2);
}

#[test]
fn dedup_folds_transitions_into_groups_under_the_lock() {
    let store = Arc::new(MemoryStore::new());
    let grouper = Arc::new(AlertGrouper::new(vec!["instance".into()]));
    let engine = engine(store.clone()).with_grouper(grouper.clone());
    let now = Utc::now();
    let cpu = labels(&[("alertname", "HighCPU"), ("instance", "n3")]);
    let disk = labels(&[("alertname", "DiskFull"), ("instance", "n3")]);

    let created = engine
        .process(&IncomingAlert::firing(cpu.clone(), Severity::Warning), now)
        .unwrap();
    assert_eq!(created.group.as_ref().unwrap().members.len(), 1);
    let second = engine
        .process(&IncomingAlert::firing(disk.clone(), Severity::Critical), now)
        .unwrap();
    let group = second.group.unwrap();
    assert_eq!(group.members.len(), 2);
    assert_eq!(group.severity, Severity::Critical);

    engine.acknowledge(&created.fingerprint, now).unwrap();
    engine
        .process(&IncomingAlert::resolved(disk), now + Duration::seconds(1))
        .unwrap();
    assert_eq!(
        grouper.get("instance=n3").unwrap().status,
        AlertStatus::Acknowledged
    );

    let closed = engine
        .process(&IncomingAlert::resolved(cpu.clone()), now + Duration::seconds(2))
        .unwrap()
        .group
        .unwrap();
    assert_eq!(closed.status, AlertStatus::Resolved);
    assert!(grouper.groups().is_empty());

    // Resolved event for an already resolved alert changes nothing
    let ignored = engine
        .process(&IncomingAlert::resolved(cpu), now + Duration::seconds(3))
        .unwrap();
    assert_eq!(ignored.action, DedupAction::Ignore);
    assert!(ignored.group.is_none());
    assert!(grouper.groups().is_empty());
}

// --- silencing ---

fn silence(id: &str, selector: &str, starts: DateTime<Utc>, ends: DateTime<Utc>) -> Silence {
    Silence {
        id: id.into(),
        matchers: MatcherSet::parse(selector).unwrap(),
        starts_at: starts,
        ends_at: ends,
        creator: "ops".into(),
        comment: String::new(),
    }
}

#[test]
fn active_matching_silence_mutes() {
    let now = Utc::now();
    let engine = SilenceEngine::new();
    let silences = vec![
        silence(
            "expired",
            "{alertname=\"HighCPU\"}",
            now - Duration::hours(2),
            now - Duration::hours(1),
        ),
        silence(
            "web",
            "{alertname=\"HighCPU\", instance=~\"web-.*\"}",
            now - Duration::minutes(1),
            now + Duration::hours(1),
        ),
    ];

    assert_eq!(
        engine.find_silence(&high_cpu(), &silences, now).map(|s| s.id.as_str()),
        Some("web")
    );

    let db = labels(&[("alertname", "HighCPU"), ("instance", "db-01")]);
    assert!(!engine.is_silenced(&db, &silences, now));
    assert!(!engine.is_silenced(&high_cpu(), &silences, now + Duration::hours(2)));
}

// --- inhibition ---

fn node_down_rule() -> InhibitionRule {
    InhibitionRule {
        id: "node-down".into(),
        name: "node down mutes services".into(),
        source_matchers: MatcherSet::parse("alertname=NodeDown").unwrap(),
        target_matchers: MatcherSet::parse("alertname=ServiceDown").unwrap(),
        equal: vec!["instance".into()],
        priority: 0,
        enabled: true,
    }
}

#[test]
fn node_down_inhibits_services_on_same_node_only() {
    let now = Utc::now();
    let engine = InhibitionEngine::new(Duration::minutes(10));
    let rules = vec![node_down_rule()];
    let node_down = alert_at(&[("alertname", "NodeDown"), ("instance", "node1")], Severity::Critical, now);
    let svc1 = alert_at(&[("alertname", "ServiceDown"), ("instance", "node1")], Severity::Warning, now);
    let svc2 = alert_at(&[("alertname", "ServiceDown"), ("instance", "node2")], Severity::Warning, now);
    let active = vec![node_down.clone(), svc1.clone(), svc2.clone()];

    let status = engine.evaluate(&svc1, &rules, &active, now).unwrap();
    assert_eq!(status.source_fingerprint, node_down.fingerprint);
    assert_eq!(status.rule_id, "node-down");
    assert_eq!(status.expires_at, now + Duration::minutes(10));

    assert!(engine.evaluate(&svc2, &rules, &active, now).is_none());
    assert!(engine.evaluate(&node_down, &rules, &active, now).is_none());
    assert_eq!(engine.len(), 1);
    assert!(engine.status_of(&svc1.fingerprint, now).is_some());

    // Source resolves: the next pass lifts the inhibition
    let mut resolved_source = node_down.clone();
    resolved_source.status = AlertStatus::Resolved;
    let report = engine.reevaluate(&[resolved_source, svc1.clone(), svc2], &rules, now);
    assert_eq!(report.cleared, vec![svc1.fingerprint.clone()]);
    assert!(engine.is_empty());
}

#[test]
fn inhibition_status_expires_without_confirmation() {
    let now = Utc::now();
    let engine = InhibitionEngine::new(Duration::minutes(10));
    let rules = vec![node_down_rule()];
    let node_down = alert_at(&[("alertname", "NodeDown"), ("instance", "n")], Severity::Critical, now);
    let svc = alert_at(&[("alertname", "ServiceDown"), ("instance", "n")], Severity::Warning, now);
    let active = vec![node_down, svc.clone()];

    engine.evaluate(&svc, &rules, &active, now).unwrap();
    let later = now + Duration::minutes(11);
    assert!(engine.status_of(&svc.fingerprint, later).is_none());
    assert_eq!(engine.purge_expired(later), 1);
    assert!(engine.is_empty());
}

#[test]
fn disabled_inhibition_rule_is_skipped() {
    let now = Utc::now();
    let engine = InhibitionEngine::default();
    let mut rule = node_down_rule();
    rule.enabled = false;
    let node_down = alert_at(&[("alertname", "NodeDown"), ("instance", "n")], Severity::Critical, now);
    let svc = alert_at(&[("alertname", "ServiceDown"), ("instance", "n")], Severity::Warning, now);
    assert!(engine
        .evaluate(&svc, &[rule], &[node_down, svc.clone()], now)
        .is_none());
}

#[test]
fn reevaluation_picks_up_new_sources() {
    let now = Utc::now();
    let engine = InhibitionEngine::default();
    let rules = vec![node_down_rule()];
    let svc = alert_at(&[("alertname", "ServiceDown"), ("instance", "n")], Severity::Warning, now);
    assert!(engine.evaluate(&svc, &rules, &[svc.clone()], now).is_none());

    let node_down = alert_at(&[("alertname", "NodeDown"), ("instance", "n")], Severity::Critical, now);
    let report = engine.reevaluate(&[svc.clone(), node_down], &rules, now);
    assert_eq!(report.inhibited, vec![svc.fingerprint]);
    assert!(report.cleared.is_empty());
}

#[test]
fn inhibition_matches_on_severity_and_status() {
    let now = Utc::now();
    let engine = InhibitionEngine::default();
    let rules = vec![InhibitionRule {
        id: "critical-mutes-warning".into(),
        name: String::new(),
        source_matchers: MatcherSet::parse("severity=critical, status=firing").unwrap(),
        target_matchers: MatcherSet::parse("severity=warning").unwrap(),
        equal: vec!["instance".into()],
        priority: 0,
        enabled: true,
    }];
    let outage = alert_at(&[("alertname", "NodeDown"), ("instance", "n5")], Severity::Critical, now);
    let slow = alert_at(&[("alertname", "SlowDisk"), ("instance", "n5")], Severity::Warning, now);
    let active = vec![outage.clone(), slow.clone()];

    let status = engine.evaluate(&slow, &rules, &active, now).unwrap();
    assert_eq!(status.source_fingerprint, outage.fingerprint);
    assert!(engine.evaluate(&outage, &rules, &active, now).is_none());

    // An acknowledged source no longer matches status=firing
    let mut acked = outage;
    acked.status = AlertStatus::Acknowledged;
    assert!(engine
        .evaluate(&slow, &rules, &[acked, slow.clone()], now)
        .is_none());
}

// --- routing ---

fn route(id: &str, priority: i32, selector: &str, channel: &str, cont: bool) -> RoutingRule {
    RoutingRule {
        id: id.into(),
        name: id.into(),
        priority,
        enabled: true,
        conditions: MatcherSet::parse(selector).unwrap(),
        receivers: vec![Receiver::new(channel)],
        continue_matching: cont,
    }
}

#[test]
fn highest_priority_match_wins() {
    let engine = RoutingEngine::new(vec![]);
    let rules = vec![
        route("catch-all", 1, "alertname=~\".+\"", "email", false),
        route("critical", 10, "severity=critical", "pager", false),
    ];
    let critical = labels(&[("alertname", "HighCPU"), ("severity", "critical")]);
    let warning = labels(&[("alertname", "HighCPU"), ("severity", "warning")]);

    let res = engine.resolve(&critical, &rules);
    assert_eq!(res.matched_rules, vec!["critical"]);
    assert_eq!(res.receivers, vec![Receiver::new("pager")]);
    assert!(!res.defaulted);

    let res = engine.resolve(&warning, &rules);
    assert_eq!(res.receivers, vec![Receiver::new("email")]);
}

#[test]
fn continue_matching_accumulates_receivers() {
    let engine = RoutingEngine::new(vec![]);
    let rules = vec![
        route("critical", 10, "severity=critical", "pager", true),
        route("b-catch-all", 1, "{}", "email", false),
        route("a-catch-all", 1, "{}", "pager", false),
    ];
    let critical = labels(&[("alertname", "HighCPU"), ("severity", "critical")]);

    let res = engine.resolve(&critical, &rules);
    // Tie on priority 1 is broken by id; duplicate receivers collapse
    assert_eq!(res.matched_rules, vec!["critical", "a-catch-all"]);
    assert_eq!(res.receivers, vec![Receiver::new("pager")]);
}

#[test]
fn unmatched_alert_uses_default_receivers() {
    let rules = vec![route("critical", 10, "severity=critical", "pager", false)];
    let info = labels(&[("alertname", "Heartbeat"), ("severity", "info")]);

    let with_default = RoutingEngine::new(vec![Receiver::new("fallback")]);
    let res = with_default.resolve(&info, &rules);
    assert!(res.defaulted);
    assert_eq!(res.receivers, vec![Receiver::new("fallback")]);

    let res = RoutingEngine::default().resolve(&info, &rules);
    assert!(res.defaulted);
    assert!(res.is_empty());
}

#[test]
fn disabled_routing_rule_never_matches() {
    let mut critical = route("critical", 10, "severity=critical", "pager", false);
    critical.enabled = false;
    let rules = vec![critical, route("rest", 0, "{}", "email", false)];
    let res = RoutingEngine::default()
        .resolve(&labels(&[("alertname", "X"), ("severity", "critical")]), &rules);
    assert_eq!(res.matched_rules, vec!["rest"]);
}
