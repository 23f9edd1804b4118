//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use seatmeter_api::{AppState, build_app};
use seatmeter_auth::{Claims, JwtDecoder};
use seatmeter_core::config::{AppConfig, StoreBackend};
use seatmeter_core::traits::{AccountStore, AllowanceStore};
use seatmeter_core::types::{Allowance, ClientInfo, Identity, Plan, UserId};
use seatmeter_database::{MemoryAccountStore, MemoryAllowanceStore, MemorySessionDirectory};
use seatmeter_realtime::{Connected, EngineStores, OutboundMessage, RealtimeEngine};

pub const SECRET: &str = "integration-test-secret";

/// A user the tests mint credentials for.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl TestUser {
    /// A metered subscriber.
    pub fn member(name: &str) -> Self {
        Self {
            id: UserId::new(),
            name: name.to_string(),
            email: format!("{name}@example.com"),
            is_admin: false,
        }
    }

    /// An administrator.
    pub fn admin(name: &str) -> Self {
        Self {
            is_admin: true,
            ..Self::member(name)
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            is_admin: self.is_admin,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Response captured from a router call.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Test application context over in-memory stores
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// The engine behind the router
    pub engine: Arc<RealtimeEngine>,
    /// Application config
    pub config: AppConfig,
    pub accounts: MemoryAccountStore,
    pub allowances: MemoryAllowanceStore,
    pub sessions: MemorySessionDirectory,
}

/// Configuration used by every test unless overridden.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.database.backend = StoreBackend::Memory;
    config.auth.jwt_secret = SECRET.to_string();
    config.worker.enabled = false;
    config
}

impl TestApp {
    /// Create a new test application with the default test config
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a new test application. Must be called inside a tokio runtime
    /// so the meter clock follows that runtime's time.
    pub fn with_config(config: AppConfig) -> Self {
        let accounts = MemoryAccountStore::new();
        let allowances = MemoryAllowanceStore::new();
        let sessions = MemorySessionDirectory::new();

        let stores = EngineStores {
            identity: Arc::new(JwtDecoder::new(&config.auth)),
            accounts: Arc::new(accounts.clone()),
            allowances: Arc::new(allowances.clone()),
            sessions: Arc::new(sessions.clone()),
        };
        let engine = Arc::new(RealtimeEngine::new(&config, stores));
        let router = build_app(AppState::new(
            Arc::new(config.clone()),
            Arc::clone(&engine),
        ));

        Self {
            router,
            engine,
            config,
            accounts,
            allowances,
            sessions,
        }
    }

    /// Mint a valid credential for `user`
    pub fn token(&self, user: &TestUser) -> String {
        let claims = Claims {
            sub: user.id.into_uuid(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: if user.is_admin { "admin" } else { "member" }.to_string(),
            exp: Utc::now().timestamp() + 3600,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("Failed to mint token")
    }

    /// Store an allowance for `user` as of the engine clock
    pub async fn grant(&self, user: &TestUser, plan: Plan) {
        let now = self.engine.meter.clock().now();
        self.allowances
            .save(&Allowance::from_plan(user.id, plan, now).expect("Invalid plan"))
            .await
            .expect("Failed to store allowance");
    }

    /// Set the per-user cap override directly in the account store
    pub async fn set_cap(&self, user: &TestUser, cap: u32) {
        self.accounts
            .set_override(&user.id, Some(cap))
            .await
            .expect("Failed to set cap");
    }

    /// Admit a connection for `user` through the credential path
    pub async fn connect(&self, user: &TestUser) -> Connected {
        self.connect_from(user, "203.0.113.10").await
    }

    /// Admit a connection for `user` from a given address
    pub async fn connect_from(&self, user: &TestUser, address: &str) -> Connected {
        let client = ClientInfo {
            network_address: address.to_string(),
            user_agent: Some("integration-test".to_string()),
        };
        self.engine
            .connect_with_credential(&self.token(user), client)
            .await
            .expect("Credential rejected")
    }

    /// Make a request against the router
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router call failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Drain every message currently queued for a connection.
pub fn drain(outbound: &mut mpsc::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = outbound.try_recv() {
        messages.push(msg);
    }
    messages
}

/// Random user path segment for admin routes.
pub fn user_path(user: &TestUser, action: &str) -> String {
    format!("/api/admin/users/{}/{action}", user.id)
}

/// A user ID nobody holds.
pub fn unknown_user() -> Uuid {
    Uuid::new_v4()
}
