//! Integration tests for the HTTP surface: health, admin routes, and the
//! WebSocket credential gate.

mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use seatmeter_core::types::{AllowanceStatus, Grant, Plan, UserId};
use seatmeter_realtime::OutboundMessage;

use helpers::{TestApp, TestUser, drain, unknown_user, user_path};

#[tokio::test]
async fn test_health_reports_counts() {
    let app = TestApp::new();
    let user = TestUser::member("amy");
    app.grant(&user, Plan::Days { days: 30 }).await;
    let _conn = app.connect(&user).await;

    let response = app.request("GET", "/api/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["data"]["status"], "ok");
    assert_eq!(response.body["data"]["connections"], 1);
    assert_eq!(response.body["data"]["users"], 1);
    assert_eq!(response.body["data"]["meters"], 0);
}

#[tokio::test]
async fn test_admin_routes_require_admin_bearer() {
    let app = TestApp::new();
    let member = TestUser::member("ben");

    let anonymous = app
        .request("GET", "/api/admin/connections", None, None)
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["error"], "UNAUTHORIZED");

    let garbage = app
        .request("GET", "/api/admin/connections", None, Some("not-a-jwt"))
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);

    let token = app.token(&member);
    let forbidden = app
        .request("GET", "/api/admin/connections", None, Some(&token))
        .await;
    assert_eq!(forbidden.status, StatusCode::FORBIDDEN);

    let forbidden_write = app
        .request(
            "PUT",
            &user_path(&member, "limit"),
            Some(json!({ "limit": 5 })),
            Some(&token),
        )
        .await;
    assert_eq!(forbidden_write.status, StatusCode::FORBIDDEN);
    assert!(app.accounts.peek_override(&member.id).is_none());
}

#[tokio::test]
async fn test_list_connections_is_redacted() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("cat");
    app.grant(&user, Plan::Days { days: 30 }).await;
    let _conn = app.connect_from(&user, "198.51.100.4").await;

    let response = app
        .request(
            "GET",
            "/api/admin/connections",
            None,
            Some(&app.token(&admin)),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let entries = response.body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["userId"], user.id.to_string());
    assert_eq!(entries[0]["name"], "cat");
    assert!(!response.body.to_string().contains("198.51.100.4"));
}

#[tokio::test]
async fn test_apply_plan_over_http() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("dan");
    app.grant(&user, Plan::Days { days: 30 }).await;
    let mut conn = app.connect(&user).await;
    drain(&mut conn.outbound);

    let response = app
        .request(
            "POST",
            &user_path(&user, "plan"),
            Some(json!({ "plan": { "mode": "hours", "hours": 2.0 }, "connectionCap": 2 })),
            Some(&app.token(&admin)),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["mode"], "hours");
    assert_eq!(response.body["data"]["available"], 2.0);

    assert!(matches!(
        drain(&mut conn.outbound).as_slice(),
        [OutboundMessage::ForcedDisconnect { reason }] if reason == "plan updated"
    ));

    let stored = app.allowances.peek(&user.id).unwrap();
    assert_eq!(stored.status, AllowanceStatus::Active);
    assert!(matches!(
        stored.grant,
        Grant::Hours { meter_started_at: None, .. }
    ));

    app.connect(&user).await;
    let second = app.connect(&user).await;
    assert!(second.evicted.is_empty());
}

#[tokio::test]
async fn test_apply_plan_rejects_bad_bodies() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("eve");
    let token = app.token(&admin);

    let zero_cap = app
        .request(
            "POST",
            &user_path(&user, "plan"),
            Some(json!({ "plan": { "mode": "days", "days": 30 }, "connectionCap": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(zero_cap.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero_cap.body["error"], "VALIDATION_ERROR");

    let zero_days = app
        .request(
            "POST",
            &user_path(&user, "plan"),
            Some(json!({ "plan": { "mode": "days", "days": 0 } })),
            Some(&token),
        )
        .await;
    assert_eq!(zero_days.status, StatusCode::BAD_REQUEST);

    let unknown_mode = app
        .request(
            "POST",
            &user_path(&user, "plan"),
            Some(json!({ "plan": { "mode": "minutes", "minutes": 5 } })),
            Some(&token),
        )
        .await;
    assert_eq!(unknown_mode.status, StatusCode::BAD_REQUEST);

    let huge_days = app
        .request(
            "POST",
            &user_path(&user, "plan"),
            Some(json!({ "plan": { "mode": "days", "days": 4294967295u64 } })),
            Some(&token),
        )
        .await;
    assert_eq!(huge_days.status, StatusCode::BAD_REQUEST);
    assert_eq!(huge_days.body["error"], "VALIDATION_ERROR");

    assert!(app.allowances.peek(&user.id).is_none());
}

#[tokio::test]
async fn test_deactivate_over_http() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("fay");
    let token = app.token(&admin);

    let missing = app
        .request(
            "POST",
            &format!("/api/admin/users/{}/deactivate", unknown_user()),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);

    app.grant(&user, Plan::Days { days: 30 }).await;
    let ok = app
        .request("POST", &user_path(&user, "deactivate"), None, Some(&token))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(
        app.allowances.peek(&user.id).unwrap().status,
        AllowanceStatus::Cancelled
    );

    let again = app
        .request("POST", &user_path(&user, "deactivate"), None, Some(&token))
        .await;
    assert_eq!(again.status, StatusCode::OK);
}

#[tokio::test]
async fn test_set_and_clear_limit() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("gus");
    let token = app.token(&admin);

    let set = app
        .request(
            "PUT",
            &user_path(&user, "limit"),
            Some(json!({ "limit": 3 })),
            Some(&token),
        )
        .await;
    assert_eq!(set.status, StatusCode::OK);
    assert_eq!(app.accounts.peek_override(&user.id), Some(3));

    let zero = app
        .request(
            "PUT",
            &user_path(&user, "limit"),
            Some(json!({ "limit": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.accounts.peek_override(&user.id), Some(3));

    let cleared = app
        .request(
            "PUT",
            &user_path(&user, "limit"),
            Some(json!({ "limit": null })),
            Some(&token),
        )
        .await;
    assert_eq!(cleared.status, StatusCode::OK);
    assert_eq!(app.accounts.peek_override(&user.id), None);
}

#[tokio::test]
async fn test_disconnect_reports_count() {
    let app = TestApp::new();
    let admin = TestUser::admin("ops");
    let user = TestUser::member("hal");
    app.grant(&user, Plan::Days { days: 30 }).await;
    app.set_cap(&user, 3).await;

    let mut first = app.connect(&user).await;
    let _second = app.connect(&user).await;
    drain(&mut first.outbound);

    let response = app
        .request(
            "POST",
            &user_path(&user, "disconnect"),
            None,
            Some(&app.token(&admin)),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["disconnected"], 2);
    assert_eq!(app.engine.registry.count(&user.id), 0);
    assert!(matches!(
        drain(&mut first.outbound).as_slice(),
        [OutboundMessage::ForcedDisconnect { reason }] if reason == "disconnected by administrator"
    ));

    let nobody = app
        .request(
            "POST",
            &format!("/api/admin/users/{}/disconnect", UserId::new()),
            None,
            Some(&app.token(&admin)),
        )
        .await;
    assert_eq!(nobody.body["data"]["disconnected"], 0);
}

#[tokio::test]
async fn test_ws_rejects_bad_credentials_before_upgrade() {
    let app = TestApp::new();

    let missing = app.request("GET", "/ws", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);

    let bad = app.request("GET", "/ws?token=bad", None, None).await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.engine.registry.connection_count(), 0);
    assert!(app.sessions.is_empty());
}
