//! Router assembly. Grounded on the teacher's `lib.rs` module layout
//! (config/handlers/metrics/websocket as top-level modules, a single
//! `build_router`-style composition point) but collapsed to the one
//! `AppState` this gateway needs instead of the teacher's several external
//! service clients.

pub mod admin;
pub mod auth;
pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod metrics;
pub mod state;
pub mod subscriptions;
pub mod websocket;

use axum::routing::get;
use axum::Router;

pub use state::AppState;

/// Assemble the full HTTP/WebSocket surface: the collaboration endpoint
/// under `{namespace}/ws`, the read-only admin snapshots under
/// `/admin-socket`, Prometheus `/metrics`, and `/health`.
#[must_use]
pub fn build_router(state: AppState) -> Router {
	let ws_path = format!("{}/ws", state.config.namespace);

	let admin_routes = Router::new()
		.route("/admin-socket/metrics", get(admin::metrics))
		.route("/admin-socket/rooms", get(admin::rooms))
		.route("/admin-socket/users", get(admin::users))
		.route("/admin-socket/overview", get(admin::overview))
		.route("/admin-socket/aggregations/:kind", get(admin::aggregations));

	Router::new()
		.route(&ws_path, get(websocket::upgrade))
		.route("/metrics", get(admin::prometheus_metrics))
		.route("/health", get(handlers::health::health))
		.merge(admin_routes)
		.with_state(state)
}
