//! Integration tests for storage persistence
//!
//! These tests verify that:
//! - a cycle's results survive a restart of the store
//! - alert timestamps are persisted, so a restart does not re-alert

use std::sync::Arc;

use site_sentinel::config::MonitorConfig;
use site_sentinel::monitors::Cancellation;
use site_sentinel::monitors::cycle::MonitorCycle;
use site_sentinel::storage::TargetStore;
use site_sentinel::storage::sqlite::SqliteStore;
use site_sentinel::{Credentials, ServerProfile};
use tempfile::tempdir;

use crate::helpers::*;

#[tokio::test]
async fn test_cycle_results_survive_restart() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("targets.db");

    let store = Arc::new(SqliteStore::new(&db_path).await.unwrap());
    store.add_target("https://a.example").await.unwrap();
    store.toggle_notify("https://a.example").await.unwrap();
    store
        .attach_server(
            "https://a.example",
            ServerProfile::new("10.0.0.1", Credentials::key_file("root", "/keys/id")),
        )
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::delivering());
    let cycle = MonitorCycle::new(
        store.clone(),
        Arc::new(ScriptedProbe::new()),
        test_mode_collector(20.0, 92.5, 30.0),
        notifier.clone(),
        &MonitorConfig::default(),
    );

    let report = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(report.alerts_sent, 2);
    store.close().await;
    drop(cycle);

    let reopened = SqliteStore::new(&db_path).await.unwrap();
    let target = reopened
        .get_target("https://a.example")
        .await
        .unwrap()
        .unwrap();

    assert!(!target.is_up);
    assert!(target.notify_on_down);
    assert!(target.last_notification_sent.is_some());

    let server = target.server.unwrap();
    assert_eq!(server.credentials.key_path.as_deref(), Some("/keys/id"));
    assert_eq!(server.ram_usage, Some(92.5));
    assert!(server.last_ram_alert.is_some());
    assert_eq!(server.last_cpu_alert, None);

    let reopened = Arc::new(reopened);
    let cycle = MonitorCycle::new(
        reopened.clone(),
        Arc::new(ScriptedProbe::new()),
        test_mode_collector(20.0, 92.5, 30.0),
        notifier.clone(),
        &MonitorConfig::default(),
    );
    let report = cycle.run(&Cancellation::never()).await.unwrap();
    assert_eq!(report.alerts_sent, 0);
}
