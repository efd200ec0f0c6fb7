//! Read-only admin HTTP surface (spec.md §6). Every handler here is an
//! infallible snapshot of live gateway state — no mutation, no auth of its
//! own (left to whatever reverse proxy fronts it, same boundary the teacher
//! draws around its internal `metrics/observability.rs` routes).

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use gateway_events::duration_fmt::format_duration_dhms;
use gateway_events::views::RoomMemberView;
use gateway_events::{ConnectionId, RoomId, SubResourceId, UserId, Username};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;

use crate::handlers::member_view;
use crate::state::AppState;

/// Render the Prometheus text exposition format. The three gauges are
/// refreshed from the live registries just before encoding rather than kept
/// incrementally in sync, since a read on scrape is cheap and never drifts.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
	state.metrics.active_connections.set(i64::try_from(state.connections.len()).unwrap_or(i64::MAX));
	state.metrics.active_rooms.set(i64::try_from(state.rooms.room_count()).unwrap_or(i64::MAX));
	state.metrics.active_locks.set(i64::try_from(state.locks.lock_count()).unwrap_or(i64::MAX));

	let encoder = TextEncoder::new();
	let families = state.metrics.gather();
	let mut buffer = Vec::new();
	if let Err(err) = encoder.encode(&families, &mut buffer) {
		tracing::error!(error = %err, "failed to encode prometheus metrics");
	}
	([(header::CONTENT_TYPE, encoder.format_type().to_owned())], buffer)
}

fn since(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
	format_duration_dhms((now - at).to_std().unwrap_or(Duration::ZERO))
}

fn until(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
	format_duration_dhms((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
	pub active_connections: usize,
	pub unique_users: usize,
	pub active_rooms: usize,
	pub active_locks: usize,
	pub transports: HashMap<String, usize>,
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
	let active_connections = state.connections.len();
	let mut transports = HashMap::new();
	transports.insert("websocket".to_owned(), active_connections);

	Json(MetricsSnapshot {
		active_connections,
		unique_users: state.connections.unique_user_count(),
		active_rooms: state.rooms.room_count(),
		active_locks: state.locks.lock_count(),
		transports,
	})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLockView {
	pub sub_resource_id: SubResourceId,
	pub holder_user_id: UserId,
	pub holder_username: Username,
	pub held_for: String,
	pub expires_in: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
	pub room_id: RoomId,
	pub member_count: usize,
	pub members: Vec<RoomMemberView>,
	pub locks: Vec<RoomLockView>,
}

fn room_snapshots(state: &AppState) -> Vec<RoomSnapshot> {
	let now = Utc::now();
	let mut by_room: HashMap<RoomId, Vec<RoomMemberView>> = HashMap::new();
	for (room_id, member) in state.rooms.snapshot_all() {
		by_room.entry(room_id).or_default().push(member_view(&member));
	}

	let mut locks_by_room: HashMap<RoomId, Vec<RoomLockView>> = HashMap::new();
	for entry in state.locks.snapshot() {
		locks_by_room.entry(entry.room_id).or_default().push(RoomLockView {
			sub_resource_id: entry.sub_resource_id,
			holder_user_id: entry.holder.user_id,
			holder_username: entry.holder.username,
			held_for: since(entry.holder.locked_at, now),
			expires_in: until(entry.holder.expires_at, now),
		});
	}

	by_room
		.into_iter()
		.map(|(room_id, members)| {
			let locks = locks_by_room.remove(&room_id).unwrap_or_default();
			RoomSnapshot {
				member_count: members.len(),
				room_id,
				members,
				locks,
			}
		})
		.collect()
}

pub async fn rooms(State(state): State<AppState>) -> Json<Vec<RoomSnapshot>> {
	Json(room_snapshots(&state))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
	pub user_id: UserId,
	pub username: Username,
	pub connection_count: usize,
	pub connected_for: String,
}

fn user_snapshots(state: &AppState) -> Vec<UserSnapshot> {
	let now = Utc::now();
	let mut by_user: HashMap<UserId, (Username, usize, DateTime<Utc>)> = HashMap::new();
	for handle in state.connections.snapshot() {
		let entry = by_user.entry(handle.user.user_id.clone()).or_insert_with(|| (handle.user.username.clone(), 0, handle.connected_at));
		entry.1 += 1;
		if handle.connected_at < entry.2 {
			entry.2 = handle.connected_at;
		}
	}

	by_user
		.into_iter()
		.map(|(user_id, (username, connection_count, earliest))| UserSnapshot {
			user_id,
			username,
			connection_count,
			connected_for: since(earliest, now),
		})
		.collect()
}

pub async fn users(State(state): State<AppState>) -> Json<Vec<UserSnapshot>> {
	Json(user_snapshots(&state))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewSnapshot {
	pub uptime: String,
	pub active_connections: usize,
	pub unique_users: usize,
	pub active_rooms: usize,
	pub active_locks: usize,
}

pub async fn overview(State(state): State<AppState>) -> Json<OverviewSnapshot> {
	Json(OverviewSnapshot {
		uptime: since(state.started_at, Utc::now()),
		active_connections: state.connections.len(),
		unique_users: state.connections.unique_user_count(),
		active_rooms: state.rooms.room_count(),
		active_locks: state.locks.lock_count(),
	})
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketAggregation {
	pub connection_id: ConnectionId,
	pub user_id: UserId,
	pub username: Username,
	pub connected_for: String,
}

fn socket_aggregations(state: &AppState) -> Vec<SocketAggregation> {
	let now = Utc::now();
	state
		.connections
		.snapshot()
		.into_iter()
		.map(|handle| SocketAggregation {
			connection_id: handle.connection_id,
			user_id: handle.user.user_id,
			username: handle.user.username,
			connected_for: since(handle.connected_at, now),
		})
		.collect()
}

/// `GET /admin-socket/aggregations/{sockets|rooms|users}` — the same
/// entities as the three dedicated endpoints above, reshaped around
/// per-entity durations rather than aggregate counts.
pub async fn aggregations(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
	match kind.as_str() {
		"sockets" => Json(socket_aggregations(&state)).into_response(),
		"rooms" => Json(room_snapshots(&state)).into_response(),
		"users" => Json(user_snapshots(&state)).into_response(),
		_ => (StatusCode::NOT_FOUND, "unknown aggregation kind").into_response(),
	}
}
