use super::*;
use chrono::Duration as ChronoDuration;

fn registry_with(max_agents: usize) -> WorkerRegistry {
    WorkerRegistry::new(RegistryConfig::default().with_max_agents(max_agents))
}

#[test]
fn test_register_and_list() {
    let registry = WorkerRegistry::default();
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();
    registry
        .register(WorkerInfo::new("b", "Beta").with_capability("compile"))
        .unwrap();

    assert_eq!(registry.len(), 2);
    let ids: Vec<String> = registry.list_available().into_iter().map(|w| w.id).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(registry.get("b").unwrap().can_handle("compile"));
}

#[test]
fn test_register_beyond_capacity_fails() {
    let registry = registry_with(1);
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();

    match registry.register(WorkerInfo::new("b", "Beta")) {
        Err(Error::Capacity { max }) => assert_eq!(max, 1),
        other => panic!("expected Capacity, got {:?}", other),
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_reregister_same_id_overwrites_at_capacity() {
    let registry = registry_with(1);
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();
    registry
        .register(WorkerInfo::new("a", "Alpha v2").with_capability("deploy"))
        .unwrap();

    let worker = registry.get("a").unwrap();
    assert_eq!(worker.name, "Alpha v2");
    assert!(worker.can_handle("deploy"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_unregister_is_idempotent_and_frees_capacity() {
    let registry = registry_with(1);
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();

    assert!(registry.unregister("a"));
    assert!(!registry.unregister("a"));
    assert!(!registry.unregister("never-seen"));
    assert!(registry.is_empty());

    registry.register(WorkerInfo::new("b", "Beta")).unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_sweep_marks_stale_worker_offline_without_removal() {
    let registry = WorkerRegistry::default();
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("old", "Old").with_last_heartbeat(stale))
        .unwrap();
    registry.register(WorkerInfo::new("fresh", "Fresh")).unwrap();

    let expired = registry.sweep_expired(Duration::from_secs(5 * 60));

    assert_eq!(expired, vec!["old".to_string()]);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get("old").unwrap().status, WorkerStatus::Offline);
    assert_eq!(registry.get("fresh").unwrap().status, WorkerStatus::Available);

    let available: Vec<String> = registry.list_available().into_iter().map(|w| w.id).collect();
    assert_eq!(available, vec!["fresh"]);

    // second sweep reports nothing new
    assert!(registry.sweep_expired(Duration::from_secs(5 * 60)).is_empty());
}

#[test]
fn test_heartbeat_updates_timestamp_and_ignores_unknown() {
    let registry = WorkerRegistry::default();
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("a", "Alpha").with_last_heartbeat(stale))
        .unwrap();

    assert!(registry.heartbeat("a"));
    assert!(registry.get("a").unwrap().last_heartbeat > stale);
    assert!(!registry.heartbeat("ghost"));
    assert!(registry.get("ghost").is_none());
}

#[test]
fn test_heartbeat_does_not_revive_offline_by_default() {
    let registry = WorkerRegistry::default();
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("a", "Alpha").with_last_heartbeat(stale))
        .unwrap();
    registry.sweep_expired(Duration::from_secs(60));

    registry.heartbeat("a");
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Offline);

    let worker = registry.reset_status("a").unwrap();
    assert_eq!(worker.status, WorkerStatus::Available);
}

#[test]
fn test_heartbeat_revives_when_enabled() {
    let registry = WorkerRegistry::new(RegistryConfig::default().with_revive_on_heartbeat(true));
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("a", "Alpha").with_last_heartbeat(stale))
        .unwrap();
    registry.sweep_expired(Duration::from_secs(60));

    registry.heartbeat("a");
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Available);
}

#[test]
fn test_reset_status_requires_fresh_heartbeat() {
    let registry = WorkerRegistry::new(
        RegistryConfig::default().with_heartbeat_timeout(Duration::from_secs(60)),
    );
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("a", "Alpha").with_last_heartbeat(stale))
        .unwrap();
    registry.sweep();

    assert!(matches!(
        registry.reset_status("a"),
        Err(Error::Unavailable(_))
    ));
    assert!(matches!(
        registry.reset_status("missing"),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_lease_marks_busy_and_restores_on_drop() {
    let registry = WorkerRegistry::default();
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();

    {
        let lease = registry.lease("a");
        assert_eq!(lease.worker_id(), "a");
        assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Busy);
        assert!(registry.list_available().is_empty());
    }

    let worker = registry.get("a").unwrap();
    assert_eq!(worker.status, WorkerStatus::Available);
    assert_eq!(worker.active_tasks, 0);
}

#[test]
fn test_stacked_leases_release_on_last() {
    let registry = WorkerRegistry::default();
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();

    let first = registry.lease("a");
    let second = registry.lease("a");
    assert_eq!(registry.get("a").unwrap().active_tasks, 2);

    drop(first);
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Busy);

    drop(second);
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Available);
}

#[test]
fn test_lease_restored_after_panic() {
    let registry = WorkerRegistry::default();
    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();

    let cloned = registry.clone();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
        let _lease = cloned.lease("a");
        panic!("executor blew up");
    }));

    assert!(outcome.is_err());
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Available);
}

#[test]
fn test_lease_does_not_revive_offline_worker() {
    let registry = WorkerRegistry::default();
    let stale = Utc::now() - ChronoDuration::minutes(10);
    registry
        .register(WorkerInfo::new("a", "Alpha").with_last_heartbeat(stale))
        .unwrap();
    registry.sweep_expired(Duration::from_secs(60));

    drop(registry.lease("a"));
    assert_eq!(registry.get("a").unwrap().status, WorkerStatus::Offline);
}

#[test]
fn test_copy_with_change_leaves_original_untouched() {
    let worker = WorkerInfo::new("a", "Alpha");
    let busy = worker.with_status(WorkerStatus::Busy);
    assert_eq!(worker.status, WorkerStatus::Available);
    assert_eq!(busy.status, WorkerStatus::Busy);
    assert_eq!(busy.id, worker.id);
}

#[tokio::test]
async fn test_events_published() {
    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();
    let registry = WorkerRegistry::default().with_events(bus);

    registry.register(WorkerInfo::new("a", "Alpha")).unwrap();
    match rx.recv().await.unwrap() {
        OrchestrationEvent::WorkerRegistered { worker_id } => assert_eq!(worker_id, "a"),
        other => panic!("unexpected event {:?}", other),
    }
}

#[test]
fn test_concurrent_registration_respects_capacity() {
    let registry = registry_with(4);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || registry.register(WorkerInfo::new(format!("w{i}"), "w")))
        })
        .collect();

    let accepted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(accepted, 4);
    assert_eq!(registry.len(), 4);
}
