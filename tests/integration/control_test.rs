//! Integration tests for forced disconnects, subscription control, and sweeps.

mod helpers;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use seatmeter_core::error::ErrorKind;
use seatmeter_core::traits::AllowanceStore;
use seatmeter_core::types::{Allowance, AllowanceStatus, Grant, Plan};
use seatmeter_realtime::{MeterStart, OutboundMessage, PlanChange};
use seatmeter_worker::AllowanceSweep;

use helpers::{TestApp, TestUser, drain};

fn forced_reason(messages: &[OutboundMessage]) -> Option<&str> {
    messages.iter().find_map(|m| match m {
        OutboundMessage::ForcedDisconnect { reason } => Some(reason.as_str()),
        _ => None,
    })
}

#[tokio::test]
async fn test_apply_plan_replaces_allowance_and_disconnects() {
    let app = TestApp::new();
    let user = TestUser::member("sam");
    app.grant(&user, Plan::Hours { hours: 2.0 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    let snapshot = app
        .engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Days { days: 7 },
                connection_cap: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(snapshot.days_remaining, Some(7));

    assert_eq!(forced_reason(&drain(&mut conn.outbound)), Some("plan updated"));
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert_eq!(app.engine.meter.scheduled_count(), 0);

    let first = app.connect(&user).await;
    let second = app.connect(&user).await;
    assert!(second.evicted.is_empty());
    assert!(matches!(first.meter, MeterStart::Running(_)));
    assert_eq!(app.engine.registry.count(&user.id), 2);
}

#[tokio::test]
async fn test_apply_plan_revives_expired_hours() {
    let app = TestApp::new();
    let user = TestUser::member("tia");
    let now = app.engine.meter.clock().now();
    let mut allowance = Allowance::from_plan(
        user.id,
        Plan::Hours { hours: 1.0 },
        now - ChronoDuration::hours(2),
    )
    .unwrap();
    allowance.start_meter(now - ChronoDuration::hours(2));
    allowance.mark_expired(now);
    app.allowances.save(&allowance).await.unwrap();

    assert_eq!(app.connect(&user).await.meter, MeterStart::Exhausted);

    app.engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Hours { hours: 3.0 },
                connection_cap: None,
            },
        )
        .await
        .unwrap();

    let stored = app.allowances.peek(&user.id).unwrap();
    assert_eq!(stored.status, AllowanceStatus::Active);
    assert!(matches!(
        stored.grant,
        Grant::Hours { meter_started_at: None, total_hours, .. } if total_hours == 3.0
    ));

    let MeterStart::Running(snapshot) = app.connect(&user).await.meter else {
        panic!("expected access after plan re-application");
    };
    assert!(snapshot.remaining > 2.99);
    assert_eq!(snapshot.available, 3.0);
}

#[tokio::test]
async fn test_invalid_plans_rejected() {
    let app = TestApp::new();
    let user = TestUser::member("uma");

    let zero_days = app
        .engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Days { days: 0 },
                connection_cap: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(zero_days.kind, ErrorKind::Validation);

    let zero_cap = app
        .engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Hours { hours: 1.0 },
                connection_cap: Some(0),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(zero_cap.kind, ErrorKind::Validation);
    assert!(app.allowances.peek(&user.id).is_none());
}

#[tokio::test]
async fn test_oversized_days_plan_rejected_without_side_effects() {
    let app = TestApp::new();
    let user = TestUser::member("ula");
    app.grant(&user, Plan::Hours { hours: 4.0 }).await;
    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    let err = app
        .engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Days { days: u32::MAX },
                connection_cap: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let stored = app.allowances.peek(&user.id).unwrap();
    assert!(matches!(stored.grant, Grant::Hours { total_hours, .. } if total_hours == 4.0));
    assert_eq!(app.engine.registry.count(&user.id), 1);
    assert!(drain(&mut conn.outbound).is_empty());

    // A valid plan still applies afterwards.
    app.engine
        .control
        .apply_plan(
            &user.id,
            PlanChange {
                plan: Plan::Days { days: 30 },
                connection_cap: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(app.engine.registry.count(&user.id), 0);
}

#[tokio::test]
async fn test_deactivate_lifecycle() {
    let app = TestApp::new();
    let user = TestUser::member("vic");
    app.grant(&user, Plan::Days { days: 30 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    app.engine.control.deactivate(&user.id).await.unwrap();
    assert_eq!(
        forced_reason(&drain(&mut conn.outbound)),
        Some("account deactivated")
    );
    assert_eq!(
        app.allowances.peek(&user.id).unwrap().status,
        AllowanceStatus::Cancelled
    );

    app.engine.control.deactivate(&user.id).await.unwrap();

    let mut again = app.connect(&user).await;
    assert_eq!(again.meter, MeterStart::Exhausted);
    assert!(matches!(
        drain(&mut again.outbound).as_slice(),
        [OutboundMessage::AllowanceExhausted { .. }]
    ));
    assert_eq!(
        app.allowances.peek(&user.id).unwrap().status,
        AllowanceStatus::Cancelled
    );
}

#[tokio::test]
async fn test_deactivate_rejects_unknown_and_expired() {
    let app = TestApp::new();
    let stranger = TestUser::member("wes");
    let err = app.engine.control.deactivate(&stranger.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let user = TestUser::member("xia");
    let now = app.engine.meter.clock().now();
    let mut allowance = Allowance::from_plan(user.id, Plan::Days { days: 1 }, now).unwrap();
    allowance.mark_expired(now);
    app.allowances.save(&allowance).await.unwrap();

    let err = app.engine.control.deactivate(&user.id).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
async fn test_cap_override_applies_on_reconnect() {
    let app = TestApp::new();
    let user = TestUser::member("yan");
    app.grant(&user, Plan::Days { days: 30 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    app.engine
        .control
        .set_cap_override(&user.id, Some(3))
        .await
        .unwrap();
    assert_eq!(
        forced_reason(&drain(&mut conn.outbound)),
        Some("device limit changed")
    );

    for _ in 0..3 {
        app.connect(&user).await;
    }
    assert_eq!(app.engine.registry.count(&user.id), 3);

    let err = app
        .engine
        .control
        .set_cap_override(&user.id, Some(0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(app.engine.registry.count(&user.id), 3);

    app.engine
        .control
        .set_cap_override(&user.id, None)
        .await
        .unwrap();
    app.connect(&user).await;
    app.connect(&user).await;
    assert_eq!(app.engine.registry.count(&user.id), 1);
}

#[tokio::test]
async fn test_admin_force_disconnect_over_socket() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("zed");
    app.grant(&user, Plan::Days { days: 30 }).await;
    app.set_cap(&user, 2).await;

    let admin_conn = app.connect(&admin).await;
    let mut a = app.connect(&user).await;
    let mut b = app.connect(&user).await;
    drain(&mut a.outbound);
    drain(&mut b.outbound);

    let frame = format!(r#"{{"type":"force-disconnect","userId":"{}"}}"#, user.id);
    app.engine.handle_inbound(&admin_conn.handle, &frame).await;

    assert_eq!(
        forced_reason(&drain(&mut a.outbound)),
        Some("disconnected by administrator")
    );
    assert_eq!(
        forced_reason(&drain(&mut b.outbound)),
        Some("disconnected by administrator")
    );
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert_eq!(app.engine.registry.count(&admin.id), 1);
}

#[tokio::test]
async fn test_member_cannot_force_disconnect() {
    let app = TestApp::new();
    let attacker = TestUser::member("amy");
    let victim = TestUser::member("bob");
    app.grant(&attacker, Plan::Days { days: 30 }).await;
    app.grant(&victim, Plan::Days { days: 30 }).await;

    let mut attacker_conn = app.connect(&attacker).await;
    let _victim_conn = app.connect(&victim).await;
    drain(&mut attacker_conn.outbound);

    let frame = format!(r#"{{"type":"force-disconnect","userId":"{}"}}"#, victim.id);
    app.engine.handle_inbound(&attacker_conn.handle, &frame).await;

    assert!(matches!(
        drain(&mut attacker_conn.outbound).as_slice(),
        [OutboundMessage::Error { code, .. }] if code == "FORBIDDEN"
    ));
    assert_eq!(app.engine.registry.count(&victim.id), 1);
}

#[tokio::test]
async fn test_navigation_reaches_directory() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("cal");
    app.grant(&user, Plan::Days { days: 30 }).await;

    let mut admin_conn = app.connect(&admin).await;
    let mut member = app.connect(&user).await;
    drain(&mut admin_conn.outbound);
    drain(&mut member.outbound);

    app.engine
        .handle_inbound(
            &member.handle,
            r#"{"type":"page-enter","path":"/courses/rust","title":"Rust"}"#,
        )
        .await;

    let latest = drain(&mut admin_conn.outbound)
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::DirectorySnapshot { connections } => Some(connections),
            _ => None,
        })
        .last()
        .expect("no directory after navigation");
    let entry = latest
        .iter()
        .find(|e| e.connection_id == member.handle.id)
        .expect("member missing from directory");
    assert_eq!(
        entry.current_page.as_ref().map(|p| p.path.as_str()),
        Some("/courses/rust")
    );

    app.engine
        .handle_inbound(&member.handle, r#"{"type":"page-leave"}"#)
        .await;
    assert!(member.handle.current_page().await.is_none());

    app.engine.handle_inbound(&member.handle, "{not json").await;
    assert!(matches!(
        drain(&mut member.outbound).as_slice(),
        [OutboundMessage::Error { code, .. }] if code == "INVALID_MESSAGE"
    ));
}

#[tokio::test]
async fn test_allowance_sweep_expires_finished_window() {
    let app = TestApp::new();
    let user = TestUser::member("dot");
    app.grant(&user, Plan::Days { days: 1 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    let sweep = AllowanceSweep::new(
        Arc::new(app.allowances.clone()),
        Arc::clone(&app.engine.lanes),
        Arc::clone(&app.engine.dispatcher),
        app.config.metering.expiring_soon_days,
    );

    let now = app.engine.meter.clock().now();
    let report = sweep.run(now + ChronoDuration::hours(1)).await.unwrap();
    assert_eq!(report.expiring_soon, 1);
    assert_eq!(app.engine.registry.count(&user.id), 1);

    let report = sweep.run(now + ChronoDuration::days(2)).await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert!(matches!(
        drain(&mut conn.outbound).as_slice(),
        [OutboundMessage::AllowanceExhausted { .. }]
    ));
}
