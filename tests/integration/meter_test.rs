//! Integration tests for hours/days metering. All run on paused tokio time
//! with a 0.1 hour tick.

mod helpers;

use std::time::Duration;

use chrono::Duration as ChronoDuration;

use seatmeter_core::traits::AllowanceStore;
use seatmeter_core::types::{Allowance, AllowanceStatus, Grant, Plan};
use seatmeter_realtime::{MeterStart, OutboundMessage};

use helpers::{TestApp, TestUser, drain, test_config};

const TICK: Duration = Duration::from_secs(360);
const TICK_HOURS: f64 = 0.1;

fn metered_app() -> TestApp {
    let mut config = test_config();
    config.metering.tick_interval_seconds = TICK.as_secs();
    TestApp::with_config(config)
}

fn remaining_values(messages: &[OutboundMessage]) -> Vec<f64> {
    messages
        .iter()
        .filter_map(|m| match m {
            OutboundMessage::AllowanceUpdated(s) => Some(s.remaining),
            _ => None,
        })
        .collect()
}

/// Sleep just past `n` ticks so every tick due in that window has run.
async fn ticks(n: u32) {
    tokio::time::sleep(TICK * n + Duration::from_millis(500)).await;
}

#[tokio::test(start_paused = true)]
async fn test_two_hours_run_out_after_twenty_ticks() {
    let app = metered_app();
    let user = TestUser::member("ivy");
    app.grant(&user, Plan::Hours { hours: 2.0 }).await;

    let mut conn = app.connect(&user).await;
    let MeterStart::Running(initial) = conn.meter else {
        panic!("expected a running meter, got {:?}", conn.meter);
    };
    assert_eq!(initial.remaining, 2.0);
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 1);

    ticks(1).await;
    let after_one = remaining_values(&drain(&mut conn.outbound));
    let last = *after_one.last().expect("no update after one tick");
    assert!((last - 1.9).abs() < TICK_HOURS, "remaining {last}");

    ticks(18).await;
    let updates = remaining_values(&drain(&mut conn.outbound));
    assert_eq!(updates.len(), 18);
    assert!(updates.windows(2).all(|w| w[1] <= w[0]));
    for (k, remaining) in updates.iter().enumerate() {
        let expected = 2.0 - (k as f64 + 2.0) * TICK_HOURS;
        assert!((remaining - expected).abs() < TICK_HOURS, "tick {k}: {remaining}");
    }
    assert!(app.engine.registry.get(&conn.handle.id).is_some());

    ticks(1).await;
    let messages = drain(&mut conn.outbound);
    assert!(messages.iter().any(|m| matches!(
        m,
        OutboundMessage::AllowanceExhausted { remaining, .. } if *remaining == 0.0
    )));
    assert!(app.engine.registry.get(&conn.handle.id).is_none());
    assert_eq!(app.engine.meter.scheduled_count(), 0);

    let stored = app.allowances.peek(&user.id).unwrap();
    assert_eq!(stored.status, AllowanceStatus::Expired);
    assert!(!stored.active);

    tokio::time::sleep(app.config.metering.exhausted_grace() + Duration::from_millis(10)).await;
    assert!(conn.handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_second_connection_does_not_rewind_clock() {
    let app = metered_app();
    let user = TestUser::member("jon");
    app.grant(&user, Plan::Hours { hours: 2.0 }).await;
    app.set_cap(&user, 2).await;

    let _first = app.connect(&user).await;
    let started = match app.allowances.peek(&user.id).unwrap().grant {
        Grant::Hours {
            meter_started_at: Some(at),
            ..
        } => at,
        other => panic!("clock not started: {other:?}"),
    };

    ticks(3).await;
    let second = app.connect(&user).await;

    let MeterStart::Running(snapshot) = second.meter else {
        panic!("expected a running meter");
    };
    assert!((snapshot.remaining - 1.7).abs() < TICK_HOURS);
    assert!(matches!(
        app.allowances.peek(&user.id).unwrap().grant,
        Grant::Hours { meter_started_at: Some(at), .. } if at == started
    ));
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 2);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resumes_the_same_clock() {
    let app = metered_app();
    let user = TestUser::member("kim");
    app.grant(&user, Plan::Hours { hours: 1.0 }).await;

    let first = app.connect(&user).await;
    ticks(2).await;
    app.engine.disconnect(&first.handle).await;

    let flushed = app.allowances.peek(&user.id).unwrap();
    assert!(matches!(
        flushed.grant,
        Grant::Hours { used_hours, .. } if (used_hours - 0.2).abs() < TICK_HOURS
    ));

    let second = app.connect(&user).await;
    assert_ne!(second.handle.id, first.handle.id);
    let MeterStart::Running(snapshot) = second.meter else {
        panic!("expected a running meter");
    };
    assert!((snapshot.remaining - 0.8).abs() < TICK_HOURS);
}

#[tokio::test(start_paused = true)]
async fn test_no_meter_tasks_after_disconnect() {
    let app = metered_app();
    let user = TestUser::member("lea");
    app.grant(&user, Plan::Hours { hours: 5.0 }).await;
    app.set_cap(&user, 3).await;

    let a = app.connect(&user).await;
    let b = app.connect(&user).await;
    let c = app.connect(&user).await;
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 3);

    ticks(1).await;
    for conn in [&a, &b, &c] {
        app.engine.disconnect(&conn.handle).await;
    }
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 0);

    let before = app.engine.metrics.snapshot().meter_ticks;
    ticks(5).await;
    assert_eq!(app.engine.metrics.snapshot().meter_ticks, before);
    assert_eq!(app.engine.meter.scheduled_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent_and_keeps_connection() {
    let app = metered_app();
    let user = TestUser::member("lou");
    app.grant(&user, Plan::Hours { hours: 5.0 }).await;

    let mut conn = app.connect(&user).await;
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 1);

    app.engine.meter.stop(&conn.handle.id);
    app.engine.meter.stop(&conn.handle.id);
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 0);
    assert_eq!(app.engine.registry.count(&user.id), 1);
    assert!(conn.handle.is_alive());

    drain(&mut conn.outbound);
    ticks(3).await;
    assert!(remaining_values(&drain(&mut conn.outbound)).is_empty());

    app.engine.disconnect(&conn.handle).await;
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert_eq!(app.engine.meter.scheduled_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_evicted_connection_stops_ticking() {
    let app = metered_app();
    let user = TestUser::member("max");
    app.grant(&user, Plan::Hours { hours: 5.0 }).await;

    let mut old = app.connect(&user).await;
    let _new = app.connect(&user).await;
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 1);

    drain(&mut old.outbound);
    ticks(2).await;
    assert!(remaining_values(&drain(&mut old.outbound)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_used_up_allowance_rejected_at_admission() {
    let app = metered_app();
    let user = TestUser::member("ned");
    let now = app.engine.meter.clock().now();
    let mut allowance = Allowance::from_plan(
        user.id,
        Plan::Hours { hours: 1.0 },
        now - ChronoDuration::hours(3),
    )
    .unwrap();
    allowance.start_meter(now - ChronoDuration::hours(3));
    app.allowances.save(&allowance).await.unwrap();

    let mut conn = app.connect(&user).await;
    assert_eq!(conn.meter, MeterStart::Exhausted);
    assert!(matches!(
        drain(&mut conn.outbound).as_slice(),
        [OutboundMessage::AllowanceExhausted { .. }]
    ));
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert_eq!(app.engine.meter.scheduled_count(), 0);
    assert_eq!(
        app.allowances.peek(&user.id).unwrap().status,
        AllowanceStatus::Expired
    );

    assert!(!conn.handle.is_closed());
    tokio::time::sleep(app.config.metering.exhausted_grace() + Duration::from_millis(10)).await;
    assert!(conn.handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_no_subscription_is_exhausted() {
    let app = metered_app();
    let user = TestUser::member("ora");

    let mut conn = app.connect(&user).await;
    assert_eq!(conn.meter, MeterStart::Exhausted);
    assert!(matches!(
        drain(&mut conn.outbound).as_slice(),
        [OutboundMessage::AllowanceExhausted { message, .. }] if message == "No active subscription"
    ));
}

#[tokio::test(start_paused = true)]
async fn test_days_mode_ignores_connections() {
    let app = metered_app();
    let user = TestUser::member("pia");
    app.grant(&user, Plan::Days { days: 10 }).await;
    app.set_cap(&user, 3).await;

    let mut first = app.connect(&user).await;
    let MeterStart::Running(initial) = first.meter else {
        panic!("expected access");
    };
    assert_eq!(initial.days_remaining, Some(10));
    assert_eq!(app.engine.meter.scheduled_count(), 0);

    let _second = app.connect(&user).await;
    let _third = app.connect(&user).await;
    drain(&mut first.outbound);

    ticks(10).await;
    assert!(remaining_values(&drain(&mut first.outbound)).is_empty());

    app.engine.disconnect(&first.handle).await;
    let again = app.connect(&user).await;
    let MeterStart::Running(snapshot) = again.meter else {
        panic!("expected access");
    };
    assert_eq!(snapshot.days_remaining, Some(10));
    assert_eq!(snapshot, initial);
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_keeps_meter_running() {
    let app = metered_app();
    let user = TestUser::member("quin");
    app.grant(&user, Plan::Hours { hours: 2.0 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);
    app.allowances.set_fail_writes(true);

    ticks(2).await;
    assert_eq!(remaining_values(&drain(&mut conn.outbound)).len(), 2);
    assert!(app.engine.metrics.snapshot().allowance_write_failures >= 2);
    assert!(app.engine.registry.get(&conn.handle.id).is_some());

    app.allowances.set_fail_writes(false);
    ticks(1).await;
    let stored = app.allowances.peek(&user.id).unwrap();
    assert!(matches!(
        stored.grant,
        Grant::Hours { used_hours, .. } if (used_hours - 0.3).abs() < TICK_HOURS
    ));
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_skips_tick() {
    let app = metered_app();
    let user = TestUser::member("rae");
    app.grant(&user, Plan::Hours { hours: 2.0 }).await;

    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);
    app.allowances.set_fail_reads(true);

    ticks(1).await;
    assert!(remaining_values(&drain(&mut conn.outbound)).is_empty());
    assert_eq!(app.engine.meter.scheduled_for(&user.id), 1);

    app.allowances.set_fail_reads(false);
    ticks(1).await;
    let updates = remaining_values(&drain(&mut conn.outbound));
    assert_eq!(updates.len(), 1);
    assert!((updates[0] - 1.8).abs() < TICK_HOURS);
}
