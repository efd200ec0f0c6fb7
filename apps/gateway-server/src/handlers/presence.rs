//! `presence:set_current_subresource` / `user:heartbeat`: the lightweight
//! activity signals the sweeper and lock timers key off. `heartbeat` has no
//! failure mode worth a wire reply — a stale connection simply stops
//! touching activity and gets swept — but `set_current_sub_resource`
//! requires room membership, per spec.md §4.2.

use chrono::Utc;
use gateway_core::{GatewayError, Result};
use gateway_events::inbound::{HeartbeatPayload, SetCurrentSubResourcePayload};
use gateway_events::outbound::PresenceUpdatedPayload;
use gateway_events::{ConnectionId, ServerEvent};

use crate::state::AppState;

pub async fn set_current_sub_resource(state: &AppState, connection_id: &ConnectionId, payload: SetCurrentSubResourcePayload) -> Result<()> {
	let now = Utc::now();
	let Some(members) = state.rooms.set_current_sub_resource(&payload.room_id, connection_id, payload.sub_resource_type, now) else {
		return Err(GatewayError::UserNotInRoom);
	};
	let Some(member) = members.iter().find(|m| m.connection_id == *connection_id) else {
		return Err(GatewayError::UserNotInRoom);
	};
	let _ = state
		.bus
		.broadcast_to_room(
			&payload.room_id,
			ServerEvent::PresenceUpdated(PresenceUpdatedPayload {
				room_id: payload.room_id.clone(),
				event_type: "subresource_changed",
				trigger_user_id: member.user_id.clone(),
				users: members.iter().map(super::member_view).collect(),
				timestamp: now,
			}),
		)
		.await;
	Ok(())
}

pub fn heartbeat(state: &AppState, connection_id: &ConnectionId, payload: HeartbeatPayload) -> Result<()> {
	let last_activity = payload.last_activity.unwrap_or_else(Utc::now);
	state.rooms.touch_activity(connection_id, last_activity);
	Ok(())
}
