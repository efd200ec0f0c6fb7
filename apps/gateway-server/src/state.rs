//! Composition root. Grounded on the teacher's `lib.rs` `AppState` /
//! `CoreContext` / `ExternalApis` split — here collapsed to a single flat
//! struct since the gateway has one cohesive domain rather than the
//! teacher's several unrelated external integrations.

use std::sync::Arc;

use axum::extract::FromRef;
use chrono::{DateTime, Utc};
use gateway_bus::RoomBus;
use gateway_conn_guard::ConnectionGuard;
use gateway_core::{ActivitySweeper, ConnectionRegistry, LockManager, ResourceJoinService, RoomLimits, RoomRegistry, SupportedResourceTypes};
use gateway_ratelimit::RateLimiter;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::metrics::GatewayMetrics;

#[derive(Clone)]
pub struct AppState {
	pub config: Arc<Config>,
	pub connections: ConnectionRegistry,
	pub rooms: RoomRegistry,
	pub locks: LockManager,
	pub bus: Arc<RoomBus>,
	pub resource_join: Arc<ResourceJoinService>,
	pub conn_guard: ConnectionGuard,
	pub rate_limiter: Arc<RateLimiter>,
	pub metrics: Arc<GatewayMetrics>,
	pub shutdown: CancellationToken,
	pub started_at: DateTime<Utc>,
}

impl AppState {
	#[must_use]
	pub fn build(config: Arc<Config>) -> (Self, ActivitySweeper) {
		let connections = ConnectionRegistry::new();
		let room_limits = RoomLimits { default: config.room_limit_default, per_resource_type: config.room_limits.clone() };
		let rooms = RoomRegistry::new(room_limits);
		let bus = Arc::new(RoomBus::new());
		let locks = LockManager::with_durations(connections.clone(), rooms.clone(), bus.clone(), config.lock_ttl(), config.warning_before());
		let validator = Arc::new(gateway_core::AlwaysOpenResourceValidator);
		let resource_join = Arc::new(ResourceJoinService::new(rooms.clone(), locks.clone(), validator, SupportedResourceTypes::default(), config.enable_auto_lock));
		let conn_guard = ConnectionGuard::new(config.max_connections_per_user);
		let rate_limiter = Arc::new(RateLimiter::new());
		let metrics = Arc::new(GatewayMetrics::new());
		let shutdown = CancellationToken::new();
		let started_at = Utc::now();

		let sweeper = ActivitySweeper::spawn(rooms.clone(), locks.clone(), config.sweep_interval());

		(
			Self {
				config,
				connections,
				rooms,
				locks,
				bus,
				resource_join,
				conn_guard,
				rate_limiter,
				metrics,
				shutdown,
				started_at,
			},
			sweeper,
		)
	}
}

impl FromRef<AppState> for Arc<Config> {
	fn from_ref(state: &AppState) -> Self {
		state.config.clone()
	}
}

impl FromRef<AppState> for CancellationToken {
	fn from_ref(state: &AppState) -> Self {
		state.shutdown.clone()
	}
}
