//! Integration tests for admission control and FIFO eviction.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use seatmeter_core::error::ErrorKind;
use seatmeter_core::types::{ClientInfo, Plan};
use seatmeter_realtime::{MeterStart, OutboundMessage};

use helpers::{TestApp, TestUser, drain};

const DAYS_30: Plan = Plan::Days { days: 30 };

#[tokio::test]
async fn test_cap_never_exceeded() {
    let app = TestApp::new();
    let user = TestUser::member("ana");
    app.grant(&user, DAYS_30).await;
    app.set_cap(&user, 2).await;

    for _ in 0..5 {
        let connected = app.connect(&user).await;
        assert!(matches!(connected.meter, MeterStart::Running(_)));
        assert!(app.engine.registry.count(&user.id) <= 2);
    }
    assert_eq!(app.engine.registry.count(&user.id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_oldest_connection_evicted_first() {
    let app = TestApp::new();
    let user = TestUser::member("ben");
    app.grant(&user, DAYS_30).await;
    app.set_cap(&user, 2).await;

    let mut a = app.connect(&user).await;
    let b = app.connect(&user).await;
    assert!(b.evicted.is_empty());

    let c = app.connect(&user).await;
    assert_eq!(c.evicted, vec![a.handle.id]);

    let live: Vec<_> = app
        .engine
        .registry
        .connections_for(&user.id)
        .iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(live, vec![b.handle.id, c.handle.id]);

    let messages = drain(&mut a.outbound);
    assert!(matches!(
        messages.last(),
        Some(OutboundMessage::ForcedDisconnect { reason }) if reason == "device limit reached"
    ));
    assert!(!a.handle.is_closed());

    tokio::time::sleep(Duration::from_millis(
        app.config.realtime.disconnect_delay_ms + 10,
    ))
    .await;
    assert!(a.handle.is_closed());
    assert!(!b.handle.is_closed());
}

#[tokio::test]
async fn test_concurrent_admissions_respect_cap() {
    let app = TestApp::new();
    let user = TestUser::member("cleo");
    app.grant(&user, DAYS_30).await;
    app.set_cap(&user, 3).await;

    let token = app.token(&user);
    let mut tasks = Vec::new();
    for i in 0..12 {
        let engine = Arc::clone(&app.engine);
        let token = token.clone();
        tasks.push(tokio::spawn(async move {
            let client = ClientInfo {
                network_address: format!("198.51.100.{i}"),
                user_agent: None,
            };
            engine
                .connect_with_credential(&token, client)
                .await
                .map(|c| c.handle.id)
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(app.engine.registry.count(&user.id), 3);
    assert_eq!(app.engine.meter.scheduled_count(), 0);
}

#[tokio::test]
async fn test_admins_are_uncapped_and_unmetered() {
    let app = TestApp::new();
    let admin = TestUser::admin("root");

    for _ in 0..4 {
        let connected = app.connect(&admin).await;
        assert_eq!(connected.meter, MeterStart::NotMetered);
    }
    assert_eq!(app.engine.registry.count(&admin.id), 4);
}

#[tokio::test]
async fn test_bad_credential_leaves_no_trace() {
    let app = TestApp::new();

    let err = app
        .engine
        .connect_with_credential("not-a-token", ClientInfo::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(app.engine.registry.connection_count(), 0);
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_cap_lookup_failure_falls_back_to_one() {
    let app = TestApp::new();
    let user = TestUser::member("dev");
    app.grant(&user, DAYS_30).await;
    app.set_cap(&user, 5).await;
    app.accounts.set_fail_reads(true);

    let first = app.connect(&user).await;
    let second = app.connect(&user).await;

    assert_eq!(second.evicted, vec![first.handle.id]);
    assert_eq!(app.engine.registry.count(&user.id), 1);
}

#[tokio::test]
async fn test_session_rows_per_address() {
    let app = TestApp::new();
    let user = TestUser::member("eve");
    app.grant(&user, DAYS_30).await;
    app.set_cap(&user, 4).await;

    app.connect_from(&user, "203.0.113.1").await;
    app.connect_from(&user, "203.0.113.1").await;
    app.connect_from(&user, "::ffff:203.0.113.2").await;

    assert_eq!(app.sessions.len(), 2);
}

#[tokio::test]
async fn test_session_write_failure_does_not_block_admission() {
    let app = TestApp::new();
    let user = TestUser::member("fay");
    app.grant(&user, DAYS_30).await;
    app.sessions.set_fail_writes(true);

    let connected = app.connect(&user).await;
    assert!(matches!(connected.meter, MeterStart::Running(_)));
    assert_eq!(app.engine.registry.count(&user.id), 1);
}

#[tokio::test]
async fn test_directory_goes_to_admins_only() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("gus");
    app.grant(&user, DAYS_30).await;

    let mut admin_conn = app.connect(&admin).await;
    drain(&mut admin_conn.outbound);

    let mut member = app.connect(&user).await;

    let snapshots: Vec<_> = drain(&mut admin_conn.outbound)
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::DirectorySnapshot { connections } => Some(connections),
            _ => None,
        })
        .collect();
    let latest = snapshots.last().expect("admin got no directory");
    assert_eq!(latest.len(), 2);
    assert!(latest.iter().any(|e| e.user_id == user.id && !e.is_admin));

    assert!(
        drain(&mut member.outbound)
            .iter()
            .all(|m| !matches!(m, OutboundMessage::DirectorySnapshot { .. }))
    );

    app.engine
        .handle_inbound(&member.handle, r#"{"type":"get-directory"}"#)
        .await;
    assert!(matches!(
        drain(&mut member.outbound).as_slice(),
        [OutboundMessage::Error { code, .. }] if code == "FORBIDDEN"
    ));
}

#[tokio::test]
async fn test_transport_close_updates_directory() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("hal");
    app.grant(&user, DAYS_30).await;

    let mut admin_conn = app.connect(&admin).await;
    let member = app.connect(&user).await;
    drain(&mut admin_conn.outbound);

    app.engine.disconnect(&member.handle).await;
    app.engine.disconnect(&member.handle).await;

    let snapshots: Vec<_> = drain(&mut admin_conn.outbound)
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::DirectorySnapshot { connections } => Some(connections),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].len(), 1);
    assert_eq!(app.engine.registry.count(&user.id), 0);
}
