//! End-to-end sync runs against an in-process server.

mod common;

use common::FakeServer;
use ntfy_sync::{
    ChangeEvent, Message, NtfyError, ObserverFilter, PublishRequest, Since, Store, SyncOutcome,
    SyncTrigger, Synchronizer,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const ALERTS: &str = "https://ntfy.sh/alerts";

fn setup() -> (Arc<Store>, Arc<FakeServer>, Synchronizer<FakeServer>) {
    common::init_tracing();
    let store = Arc::new(Store::in_memory());
    let server = Arc::new(FakeServer::new());
    let sync = Synchronizer::new(Arc::clone(&store), Arc::clone(&server));
    (store, server, sync)
}

#[test]
fn test_empty_history_leaves_cursor_null() {
    let (store, _server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();

    let outcome = sync.sync(sub.id, SyncTrigger::Manual).unwrap();

    assert_eq!(outcome, SyncOutcome::Unchanged);
    assert_eq!(store.since(sub.id).unwrap(), Since::All);
    assert!(store.list_notifications(sub.id).unwrap().is_empty());
}

#[test]
fn test_fresh_subscription_merges_and_orders() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    server.publish(ALERTS, "m1", 100, "hi");
    server.publish(ALERTS, "m2", 200, "bye");

    let outcome = sync.sync(sub.id, SyncTrigger::Manual).unwrap();

    assert_eq!(outcome.inserted(), 2);
    assert_eq!(store.since(sub.id).unwrap(), Since::Id("m2".into()));
    let ids: Vec<_> = store
        .list_notifications(sub.id)
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(ids, vec!["m2", "m1"]);
}

#[test]
fn test_refetched_message_is_a_noop() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    server.publish(ALERTS, "m1", 100, "hi");
    server.publish(ALERTS, "m2", 200, "bye");
    sync.sync(sub.id, SyncTrigger::Manual).unwrap();

    // A late overlapping fetch delivers m2 again
    let mut again = Message::new("m2", 200, "bye");
    again.title = Some("dup".into());
    assert!(!store.insert_notification(sub.id, again.clone()).unwrap());
    let report = store.merge(sub.id, vec![again]).unwrap();

    assert_eq!(report.inserted, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.cursor.as_deref(), Some("m2"));
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 2);
}

#[test]
fn test_out_of_range_priority_rejected_before_sending() {
    let result = PublishRequest::new("disk full").with_priority_value(7);
    assert!(matches!(result, Err(NtfyError::Validation(_))));

    let request = PublishRequest::new("disk full").with_priority_value(5).unwrap();
    assert_eq!(request.priority.value(), 5);
}

#[test]
fn test_unsubscribe_cascades() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    let other = store.add_subscription("https://ntfy.sh", "builds").unwrap();
    for i in 0..5 {
        server.publish(ALERTS, &format!("a{}", i), 100 + i, "alert");
    }
    server.publish("https://ntfy.sh/builds", "b0", 100, "green");
    sync.sync_all(SyncTrigger::Manual).unwrap();
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 5);

    assert!(store.remove_subscription(sub.id).unwrap());

    assert!(matches!(
        store.list_notifications(sub.id),
        Err(NtfyError::SubscriptionNotFound(_))
    ));
    assert!(store
        .query_notifications(|n| n.subscription == sub.id)
        .unwrap()
        .is_empty());
    assert_eq!(store.list_notifications(other.id).unwrap().len(), 1);

    // Resubscribing starts from scratch
    let again = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    assert_ne!(again.id, sub.id);
    assert_eq!(store.since(again.id).unwrap(), Since::All);
}

#[test]
fn test_cursor_resumes_from_last_merged() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    server.publish(ALERTS, "m1", 100, "one");
    sync.sync(sub.id, SyncTrigger::Periodic).unwrap();

    server.publish(ALERTS, "m2", 200, "two");
    server.publish(ALERTS, "m3", 300, "three");
    let outcome = sync.sync(sub.id, SyncTrigger::Periodic).unwrap();

    assert_eq!(outcome.inserted(), 2);
    let polls = server.polls();
    assert_eq!(polls[0].1, "all");
    assert_eq!(polls[1].1, "m1");
    assert_eq!(store.since(sub.id).unwrap(), Since::Id("m3".into()));
}

#[test]
fn test_network_failure_changes_nothing() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    server.publish(ALERTS, "m1", 100, "one");
    sync.sync(sub.id, SyncTrigger::Manual).unwrap();

    server.publish(ALERTS, "m2", 200, "two");
    server.set_offline(ALERTS, true);
    let err = sync.sync(sub.id, SyncTrigger::Manual).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 1);
    assert_eq!(store.since(sub.id).unwrap(), Since::Id("m1".into()));

    // Next trigger picks up where the last success left off
    server.set_offline(ALERTS, false);
    assert_eq!(sync.sync(sub.id, SyncTrigger::Periodic).unwrap().inserted(), 1);
}

#[test]
fn test_one_failing_subscription_does_not_block_others() {
    let (store, server, sync) = setup();
    let a = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    let b = store.add_subscription("https://ntfy.example.com", "builds").unwrap();
    server.set_offline(ALERTS, true);
    server.publish("https://ntfy.example.com/builds", "b1", 10, "ok");

    let results = sync.sync_all(SyncTrigger::Periodic).unwrap();

    for (id, result) in results {
        if id == a.id {
            assert!(result.is_err());
        } else {
            assert_eq!(id, b.id);
            assert_eq!(result.unwrap().inserted(), 1);
        }
    }
}

#[test]
fn test_concurrent_syncs_of_one_subscription() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    for i in 0..20 {
        server.publish(ALERTS, &format!("m{:02}", i), 100 + i, "x");
    }

    let sync = Arc::new(sync);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sync = Arc::clone(&sync);
            thread::spawn(move || sync.sync(sub.id, SyncTrigger::Manual).unwrap().inserted())
        })
        .collect();
    let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(inserted, 20);
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 20);
    assert_eq!(store.since(sub.id).unwrap(), Since::Id("m19".into()));
}

#[test]
fn test_observers_see_merges() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    let list = store.observe(ObserverFilter::Notifications(sub.id));

    // Nothing new, nothing to report
    sync.sync(sub.id, SyncTrigger::Periodic).unwrap();
    assert!(list.try_recv().is_err());

    server.publish(ALERTS, "m1", 100, "hi");
    sync.sync(sub.id, SyncTrigger::Periodic).unwrap();
    assert!(matches!(
        list.recv_timeout(Duration::from_secs(1)),
        Ok(ChangeEvent::Changed { .. })
    ));
}

#[test]
fn test_push_wakeup_fetches_one_message() {
    let (store, server, sync) = setup();
    let sub = store.add_subscription("https://ntfy.sh", "alerts").unwrap();
    server.publish(ALERTS, "m1", 100, "one");
    server.publish(ALERTS, "m2", 200, "two");

    assert_eq!(sync.sync_message(sub.id, "m2").unwrap().inserted(), 1);
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 1);

    // The cursor was not moved, so the next walk still sees m1
    assert_eq!(sync.sync(sub.id, SyncTrigger::Periodic).unwrap().inserted(), 1);
    assert_eq!(store.list_notifications(sub.id).unwrap().len(), 2);

    assert!(matches!(
        sync.sync_message(sub.id, "gone"),
        Err(NtfyError::NotFound(_))
    ));
}
