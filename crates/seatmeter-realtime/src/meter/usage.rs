//! Usage meter: one cancellable periodic task per metered connection.
//!
//! Days-mode allowances are checked once at start and never tick. Hours-mode
//! allowances share one clock per user (`meter_started_at`); every metered
//! connection of that user ticks against it and mirrors the elapsed time
//! into the durable record.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seatmeter_core::error::AppError;
use seatmeter_core::traits::AllowanceStore;
use seatmeter_core::types::{
    Allowance, AllowanceSnapshot, AllowanceStatus, ConnectionId, Grant, UserId,
};

use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::control::DisconnectDispatcher;
use crate::message::types::OutboundMessage;
use crate::metrics::EngineMetrics;

use super::clock::MeterClock;
use super::handle::MeterHandle;
use super::lanes::AllowanceLanes;

/// Sent when the allowance has run out.
pub const MSG_EXHAUSTED: &str = "Your allowance has been used up";
/// Sent when the user has never had a plan.
pub const MSG_NO_SUBSCRIPTION: &str = "No active subscription";
/// Sent when the allowance could not be read.
pub const MSG_UNAVAILABLE: &str = "Allowance could not be verified";

/// Result of starting the meter for a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum MeterStart {
    /// Admin connections are not metered.
    NotMetered,
    /// Access granted; hours-mode connections are now ticking.
    Running(AllowanceSnapshot),
    /// Access refused; the connection is being closed after the grace delay.
    Exhausted,
}

enum Tick {
    Continue,
    Stop,
}

/// Drives allowance consumption for metered connections.
pub struct UsageMeter {
    allowances: Arc<dyn AllowanceStore>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<DisconnectDispatcher>,
    lanes: Arc<AllowanceLanes>,
    metrics: Arc<EngineMetrics>,
    clock: MeterClock,
    tick_interval: Duration,
    /// Connection ID → user for every meter task that has not been stopped.
    scheduled: Arc<DashMap<ConnectionId, UserId>>,
}

impl std::fmt::Debug for UsageMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageMeter")
            .field("tick_interval", &self.tick_interval)
            .field("scheduled", &self.scheduled.len())
            .finish()
    }
}

impl UsageMeter {
    /// Creates a new usage meter.
    pub fn new(
        allowances: Arc<dyn AllowanceStore>,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<DisconnectDispatcher>,
        lanes: Arc<AllowanceLanes>,
        metrics: Arc<EngineMetrics>,
        clock: MeterClock,
        tick_interval: Duration,
    ) -> Self {
        Self {
            allowances,
            registry,
            dispatcher,
            lanes,
            metrics,
            clock,
            tick_interval,
            scheduled: Arc::new(DashMap::new()),
        }
    }

    /// Starts metering a freshly admitted connection.
    ///
    /// Emits the initial `allowance-updated` (or `allowance-exhausted`) to
    /// the connection.
    pub async fn start(self: &Arc<Self>, connection: &Arc<ConnectionHandle>) -> MeterStart {
        if connection.is_admin {
            return MeterStart::NotMetered;
        }

        let user_id = connection.user_id;
        let lane = self.lanes.lock(user_id).await;

        let mut allowance = match self.allowances.get(&user_id).await {
            Ok(Some(allowance)) => allowance,
            Ok(None) => {
                drop(lane);
                debug!(user_id = %user_id, "No allowance on record");
                self.dispatcher
                    .exhaust_connection(connection, MSG_NO_SUBSCRIPTION)
                    .await;
                return MeterStart::Exhausted;
            }
            Err(e) => {
                drop(lane);
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Allowance lookup failed, treating as exhausted"
                );
                self.dispatcher
                    .exhaust_connection(connection, MSG_UNAVAILABLE)
                    .await;
                return MeterStart::Exhausted;
            }
        };

        let now = self.clock.now();
        if allowance.is_exhausted(now) {
            self.expire(&mut allowance, now).await;
            drop(lane);
            self.dispatcher
                .exhaust_connection(connection, MSG_EXHAUSTED)
                .await;
            return MeterStart::Exhausted;
        }

        let ticking = matches!(allowance.grant, Grant::Hours { .. });
        if allowance.start_meter(now) {
            info!(user_id = %user_id, "Hours clock started");
            self.persist(&allowance).await;
        }
        let snapshot = allowance.snapshot(now);
        drop(lane);

        connection.send(OutboundMessage::AllowanceUpdated(snapshot));

        if ticking {
            self.schedule(connection);
        }

        MeterStart::Running(snapshot)
    }

    /// Stops the meter of a connection without removing it. Idempotent.
    pub fn stop(&self, conn_id: &ConnectionId) {
        if self.registry.stop_meter(conn_id) {
            debug!(conn_id = %conn_id, "Meter stopped");
        }
    }

    /// Mirrors the clock-derived usage into the durable record.
    ///
    /// Called when a connection goes away. Failures are logged.
    pub async fn flush(&self, user_id: &UserId) {
        let lane = self.lanes.lock(*user_id).await;
        match self.allowances.get(user_id).await {
            Ok(Some(mut allowance)) if allowance.is_meter_running() => {
                allowance.record_usage(self.clock.now());
                self.persist(&allowance).await;
            }
            Ok(_) => {}
            Err(e) => warn!(user_id = %user_id, error = %e, "Allowance flush skipped"),
        }
        drop(lane);

        if self.registry.count(user_id) == 0 {
            self.lanes.release(user_id);
        }
    }

    /// Number of meter tasks that have not been stopped.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    /// Number of running meter tasks for one user.
    pub fn scheduled_for(&self, user_id: &UserId) -> usize {
        self.scheduled.iter().filter(|e| e.value() == user_id).count()
    }

    /// The clock the meter reads.
    pub fn clock(&self) -> MeterClock {
        self.clock
    }

    fn schedule(self: &Arc<Self>, connection: &Arc<ConnectionHandle>) {
        let token = CancellationToken::new();
        self.scheduled.insert(connection.id, connection.user_id);
        let handle = MeterHandle::new(connection.id, token.clone(), Arc::clone(&self.scheduled));

        let meter = Arc::clone(self);
        let task_conn = Arc::clone(connection);
        tokio::spawn(async move {
            meter.run(task_conn, token).await;
        });

        if let Err(orphan) = self.registry.attach_meter(&connection.id, handle) {
            debug!(conn_id = %connection.id, "Connection gone before meter attached");
            orphan.cancel();
        }
    }

    async fn run(self: Arc<Self>, connection: Arc<ConnectionHandle>, token: CancellationToken) {
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Tick::Stop = self.tick(&connection, &token).await {
                        break;
                    }
                }
            }
        }

        self.scheduled.remove(&connection.id);
        debug!(conn_id = %connection.id, "Meter task finished");
    }

    async fn tick(&self, connection: &Arc<ConnectionHandle>, token: &CancellationToken) -> Tick {
        let user_id = connection.user_id;
        let lane = self.lanes.lock(user_id).await;
        if token.is_cancelled() {
            return Tick::Stop;
        }
        EngineMetrics::inc(&self.metrics.meter_ticks);

        let mut allowance = match self.allowances.get(&user_id).await {
            Ok(Some(allowance)) => allowance,
            Ok(None) => {
                drop(lane);
                self.dispatcher.exhaust_user(&user_id, MSG_NO_SUBSCRIPTION).await;
                return Tick::Stop;
            }
            Err(e) => {
                warn!(
                    conn_id = %connection.id,
                    user_id = %user_id,
                    error = %e,
                    "Allowance read failed during tick, retrying next tick"
                );
                return Tick::Continue;
            }
        };

        let now = self.clock.now();
        if allowance.is_exhausted(now) {
            self.expire(&mut allowance, now).await;
            drop(lane);
            self.dispatcher.exhaust_user(&user_id, MSG_EXHAUSTED).await;
            return Tick::Stop;
        }

        allowance.record_usage(now);
        self.persist(&allowance).await;
        let snapshot = allowance.snapshot(now);
        drop(lane);

        connection.send(OutboundMessage::AllowanceUpdated(snapshot));
        Tick::Continue
    }

    /// Marks a naturally exhausted allowance as expired. Cancelled and
    /// already expired records are left alone.
    async fn expire(&self, allowance: &mut Allowance, now: DateTime<Utc>) {
        if matches!(
            allowance.status,
            AllowanceStatus::Active | AllowanceStatus::ExpiringSoon
        ) {
            allowance.mark_expired(now);
            info!(user_id = %allowance.user_id, "Allowance expired");
            self.persist(allowance).await;
        }
    }

    async fn persist(&self, allowance: &Allowance) {
        if let Err(e) = self.allowances.save(allowance).await {
            self.write_failed(&allowance.user_id, &e);
        }
    }

    fn write_failed(&self, user_id: &UserId, error: &AppError) {
        EngineMetrics::inc(&self.metrics.allowance_write_failures);
        warn!(
            user_id = %user_id,
            error = %error,
            "Allowance write failed, keeping in-memory state until the next tick"
        );
    }
}
