//! Central inbound dispatch: legacy event-name rewriting, rate limiting,
//! routing to the per-event handler, and the error-boundary that turns any
//! [`gateway_core::GatewayError`] into a `socket:error` reply rather than a
//! disconnect (spec.md §7 — operational errors never close the connection).

use gateway_core::{AuthenticatedUser, GatewayError};
use gateway_events::outbound::RateLimitExceededPayload;
use gateway_events::{ClientEvent, ConnectionId, IntoSocketError, ServerEvent};
use gateway_ratelimit::CheckOutcome;
use tracing::{debug, warn};

use crate::handlers;
use crate::state::AppState;
use crate::subscriptions::RoomSubscriptions;

/// Rewrite a raw inbound frame's legacy `surgery:*` event name onto the
/// generic vocabulary before it is deserialized into [`ClientEvent`], and
/// pin `resourceType` to `"surgery-management"` if the legacy payload omits
/// it. Adjacently-tagged enums can't alias multiple wire names onto one
/// variant, so the rewrite happens at the raw-JSON layer instead.
fn rewrite_legacy_event_name(raw: &str) -> String {
	let Ok(mut value) = serde_json::from_str::<serde_json::Value>(raw) else {
		return raw.to_owned();
	};
	let Some(event_name) = value.get("event").and_then(|v| v.as_str()) else {
		return raw.to_owned();
	};

	let generic_name = match event_name {
		"surgery:join" => "resource:join",
		"surgery:leave" => "resource:leave",
		"surgery:subresource_lock_acquire" => "resource:subresource_lock",
		"surgery:subresource_lock_release" => "resource:subresource_unlock",
		_ => return raw.to_owned(),
	};

	if let Some(obj) = value.as_object_mut() {
		obj.insert("event".to_owned(), serde_json::Value::String(generic_name.to_owned()));
		if let Some(serde_json::Value::Object(payload)) = obj.get_mut("payload") {
			payload.entry("resourceType").or_insert_with(|| serde_json::Value::String("surgery-management".to_owned()));
		}
	}
	value.to_string()
}

/// Canonical event name used for rate-limit bucketing and logging, fixed
/// per [`ClientEvent`] variant rather than reusing the wire tag literal the
/// frame happened to arrive under (legacy aliases share their generic
/// variant's bucket).
fn event_name(event: &ClientEvent) -> &'static str {
	match event {
		ClientEvent::RoomJoin(_) => "room:join",
		ClientEvent::RoomLeave(_) => "room:leave",
		ClientEvent::RoomQueryUsers(_) => "room:query_users",
		ClientEvent::ResourceJoin(_) => "resource:join",
		ClientEvent::ResourceLeave(_) => "resource:leave",
		ClientEvent::SubResourceLock(_) => "surgery:lock",
		ClientEvent::SubResourceUnlock(_) => "resource:subresource_unlock",
		ClientEvent::LockExtend(_) => "lock:extend",
		ClientEvent::ForceRequest(_) => "resource:subresource_lock:force_request",
		ClientEvent::ForceResponse(_) => "resource:subresource_lock:force_response",
		ClientEvent::SetCurrentSubResource(_) => "presence:set_current_subresource",
		ClientEvent::Heartbeat(_) => "user:heartbeat",
	}
}

pub enum FrameOutcome {
	Handled,
	Disconnect { reason: &'static str },
}

/// Process exactly one inbound text frame for `connection_id`, in the order
/// it arrived. Frames from a single connection are always processed one at
/// a time by the caller's read loop (spec.md §5), so no additional
/// per-connection serialization is needed here.
pub async fn handle_frame(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, raw: &str) -> FrameOutcome {
	let rewritten = rewrite_legacy_event_name(raw);
	let event: ClientEvent = match serde_json::from_str(&rewritten) {
		Ok(event) => event,
		Err(err) => {
			debug!(%connection_id, error = %err, "dropping unparseable frame");
			reply_error(state, connection_id, Some(user), None, GatewayError::MalformedFrame);
			return FrameOutcome::Handled;
		}
	};

	let name = event_name(&event);
	match state.rate_limiter.check(connection_id, name) {
		CheckOutcome::Allowed => {}
		CheckOutcome::Blocked { .. } => return FrameOutcome::Handled,
		CheckOutcome::Warning { limit, violation_count } => {
			send_rate_limit_warning(state, connection_id, name, limit, violation_count);
		}
		CheckOutcome::WarnAndDisconnect { limit, violation_count } => {
			send_rate_limit_warning(state, connection_id, name, limit, violation_count);
			return FrameOutcome::Disconnect { reason: "RATE_LIMIT_DISCONNECT" };
		}
		CheckOutcome::Banned { violation_count, duration } => {
			warn!(%connection_id, violation_count, "connection banned for rate-limit abuse");
			state.metrics.connections_banned.inc();
			if let Some(handle) = state.connections.get(connection_id) {
				let banned_until = chrono::Utc::now() + chrono::Duration::from_std(duration).unwrap_or_default();
				handle.send(ServerEvent::ConnectionBanned(gateway_events::outbound::ConnectionBannedPayload {
					reason: "RATE_LIMIT_ABUSE",
					banned_until,
				}));
			}
			return FrameOutcome::Disconnect { reason: "BANNED" };
		}
	}

	let result = handlers::route(state, connection_id, user, subscriptions, event).await;
	if let Err(err) = result {
		warn!(%connection_id, error = %err, "operation failed");
		reply_error(state, connection_id, Some(user), Some(name), err);
	}

	FrameOutcome::Handled
}

fn send_rate_limit_warning(state: &AppState, connection_id: &ConnectionId, name: &'static str, limit: gateway_ratelimit::EventLimit, violation_count: u32) {
	state.metrics.rate_limit_violations.inc();
	if let Some(handle) = state.connections.get(connection_id) {
		let window_ms = u64::try_from(limit.window.as_millis()).unwrap_or(u64::MAX);
		handle.send(ServerEvent::RateLimitExceeded(RateLimitExceededPayload {
			event_name: name.to_owned(),
			limit: limit.limit,
			window: window_ms,
			violations: violation_count,
			retry_after: window_ms,
		}));
	}
}

fn reply_error(state: &AppState, connection_id: &ConnectionId, user: Option<&AuthenticatedUser>, event_name: Option<&'static str>, err: GatewayError) {
	let Some(handle) = state.connections.get(connection_id) else { return };
	let user_id = user.map(|u| u.user_id.clone());
	let socket_error = err.into_socket_error(connection_id.clone(), user_id, event_name);
	handle.send(ServerEvent::SocketError(socket_error));
}
