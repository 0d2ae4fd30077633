//! End-to-end behavior of a single monitoring cycle
//!
//! These tests verify that:
//! - each due alert channel fires exactly once per cooldown window
//! - failed deliveries are retried on the next cycle
//! - one broken target never spoils the rest of the cycle
//! - storage failures surface as a failed cycle without partial writes

use std::sync::Arc;
use std::sync::atomic::Ordering;

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use site_sentinel::Target;
use site_sentinel::monitors::Cancellation;
use site_sentinel::monitors::cycle::CycleError;

use crate::helpers::*;

#[tokio::test]
async fn test_cpu_over_threshold_sends_exactly_one_alert() {
    let store = Arc::new(CountingStore::with_targets([profiled_target(
        "https://a.example",
    )]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new().up("https://a.example")),
        test_mode_collector(95.0, 50.0, 10.0),
        notifier.clone(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(report.alerts_sent, 1);
    assert_eq!(
        notifier.subjects().await,
        vec!["Server CPU Alert - 10.0.0.1".to_string()]
    );

    let target = store.target("https://a.example").await;
    let server = target.server.unwrap();
    assert_eq!(server.cpu_usage, Some(95.0));
    assert_eq!(server.ram_usage, Some(50.0));
    assert_eq!(server.disk_usage, Some(10.0));
    assert!(server.last_cpu_alert.is_some());
    assert_eq!(server.last_ram_alert, None);
    assert_eq!(server.last_disk_alert, None);
}

#[tokio::test]
async fn test_second_cycle_within_cooldown_is_silent() {
    let store = Arc::new(CountingStore::with_targets([
        profiled_target("https://a.example").notify_on_down(true)
    ]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        test_mode_collector(95.0, 95.0, 95.0),
        notifier.clone(),
    );

    let first = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(first.alerts_sent, 4);
    let stamped = store.target("https://a.example").await;

    let second = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(second.alerts_sent, 0);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 4);

    let after = store.target("https://a.example").await;
    assert_eq!(after.last_notification_sent, stamped.last_notification_sent);
    assert_eq!(
        after.server.as_ref().unwrap().last_cpu_alert,
        stamped.server.as_ref().unwrap().last_cpu_alert
    );
}

#[tokio::test]
async fn test_alert_fires_again_after_cooldown() {
    let mut target = Target::new("https://a.example").notify_on_down(true);
    target.last_notification_sent = Some(Utc::now() - TimeDelta::seconds(3601));

    let store = Arc::new(CountingStore::with_targets([target]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        unreachable_collector(),
        notifier.clone(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(report.alerts_sent, 1);
    assert_eq!(
        notifier.subjects().await,
        vec!["Website Status Alert - https://a.example".to_string()]
    );
}

#[tokio::test]
async fn test_alert_within_cooldown_is_suppressed() {
    let mut target = Target::new("https://a.example").notify_on_down(true);
    let recent = Utc::now() - TimeDelta::seconds(60);
    target.last_notification_sent = Some(recent);

    let store = Arc::new(CountingStore::with_targets([target]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        unreachable_collector(),
        notifier.clone(),
    );

    cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 0);
    let target = store.target("https://a.example").await;
    assert!(!target.is_up);
    assert_eq!(target.last_notification_sent, Some(recent));
}

#[tokio::test]
async fn test_down_alert_requires_opt_in() {
    let store = Arc::new(CountingStore::with_targets([Target::new(
        "https://a.example",
    )]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        unreachable_collector(),
        notifier.clone(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(report.down, 1);
    assert_eq!(report.alerts_sent, 0);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 0);
    assert_eq!(store.target("https://a.example").await.last_notification_sent, None);
}

#[tokio::test]
async fn test_failed_delivery_is_retried_next_cycle() {
    let store = Arc::new(CountingStore::with_targets([
        Target::new("https://a.example").notify_on_down(true)
    ]));
    let notifier = Arc::new(RecordingNotifier::failing());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        unreachable_collector(),
        notifier.clone(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(report.alerts_failed, 1);
    assert_eq!(store.target("https://a.example").await.last_notification_sent, None);

    notifier.set_delivering(true);
    let report = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(report.alerts_sent, 1);
    assert!(
        store
            .target("https://a.example")
            .await
            .last_notification_sent
            .is_some()
    );
}

#[tokio::test]
async fn test_panicking_probe_does_not_spoil_the_cycle() {
    let store = Arc::new(CountingStore::with_targets([
        Target::new("https://a.example"),
        Target::new("https://broken.example"),
        Target::new("https://c.example"),
    ]));
    let probe = ScriptedProbe::new()
        .up("https://a.example")
        .up("https://c.example")
        .panicking("https://broken.example");
    let cycle = cycle(
        store.clone(),
        Arc::new(probe),
        unreachable_collector(),
        Arc::new(RecordingNotifier::delivering()),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(report.targets, 3);
    assert_eq!(report.up, 2);
    assert_eq!(report.down, 1);
    assert_eq!(store.commits.load(Ordering::SeqCst), 1);
    assert!(store.target("https://a.example").await.is_up);
    assert!(!store.target("https://broken.example").await.is_up);
    assert!(store.target("https://c.example").await.is_up);
}

#[tokio::test]
async fn test_unreachable_server_keeps_previous_readings() {
    let mut target = profiled_target("https://a.example");
    let server = target.server.as_mut().unwrap();
    server.cpu_usage = Some(97.0);
    server.ram_usage = Some(12.0);

    let store = Arc::new(CountingStore::with_targets([target]));
    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new().up("https://a.example")),
        unreachable_collector(),
        notifier.clone(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(report.collected, 0);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 0);

    let server = store.target("https://a.example").await.server.unwrap();
    assert_eq!(server.cpu_usage, Some(97.0));
    assert_eq!(server.ram_usage, Some(12.0));
    assert_eq!(server.last_checked, None);
}

#[tokio::test]
async fn test_no_targets_is_a_no_op() {
    let store = Arc::new(CountingStore::with_targets([]));
    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        unreachable_collector(),
        Arc::new(RecordingNotifier::delivering()),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();

    assert_eq!(report.targets, 0);
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_list_failure_is_a_storage_error() {
    let store = Arc::new(CountingStore::with_targets([Target::new(
        "https://a.example",
    )]));
    store.fail_list(true);
    let probe = Arc::new(ScriptedProbe::new());
    let cycle = cycle(
        store.clone(),
        probe.clone(),
        unreachable_collector(),
        Arc::new(RecordingNotifier::delivering()),
    );

    let result = cycle.run(&Cancellation::never()).await;

    assert_matches!(result, Err(CycleError::Storage(e)) if e.is_unavailable());
    assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_commit_failure_leaves_stored_state_untouched() {
    let store = Arc::new(CountingStore::with_targets([Target::new(
        "https://a.example",
    )]));
    store.fail_commit(true);
    let before = store.target("https://a.example").await;

    let cycle = cycle(
        store.clone(),
        Arc::new(ScriptedProbe::new().up("https://a.example")),
        unreachable_collector(),
        Arc::new(RecordingNotifier::delivering()),
    );

    let result = cycle.run(&Cancellation::never()).await;

    assert_matches!(result, Err(CycleError::Storage(_)));
    assert_eq!(store.target("https://a.example").await, before);
}

#[tokio::test]
async fn test_cancelled_cycle_commits_nothing() {
    let store = Arc::new(CountingStore::with_targets([Target::new(
        "https://a.example",
    )]));
    let probe = Arc::new(ScriptedProbe::new().slow(std::time::Duration::from_secs(30)));
    let cycle = cycle(
        store.clone(),
        probe.clone(),
        unreachable_collector(),
        Arc::new(RecordingNotifier::delivering()),
    );

    let (tx, cancel) = Cancellation::channel();
    let stopper = async {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.send(true).unwrap();
    };

    let (result, ()) = tokio::join!(cycle.run(&cancel), stopper);

    assert_matches!(result, Err(CycleError::Cancelled));
    assert_eq!(store.commits.load(Ordering::SeqCst), 0);
    assert!(probe.abandoned.load(Ordering::SeqCst));
}
