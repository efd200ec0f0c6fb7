//! `resource:join` / `resource:leave`: the typed-resource layer on top of
//! plain room membership — validates the resource exists and is open via
//! the [`gateway_core::validator::ResourceValidator`] port, then optionally
//! attempts an auto-lock of an initial sub-resource (spec.md §4.3).

use gateway_core::{AuthenticatedUser, GatewayError, Result};
use gateway_events::inbound::{ResourceJoinPayload, ResourceLeavePayload};
use gateway_events::outbound::{ResourceJoinRejectedPayload, RoomJoinedPayload};
use gateway_events::{ConnectionId, IntoSocketError, RoomId, ServerEvent};

use crate::state::AppState;
use crate::subscriptions::RoomSubscriptions;

use super::member_view;
use super::room::leave_room;

pub async fn join(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, payload: ResourceJoinPayload) -> Result<()> {
	let Some(handle) = state.connections.get(connection_id) else {
		return Err(GatewayError::Unauthenticated);
	};

	match state
		.resource_join
		.join(&payload.resource_type, &payload.resource_uuid, payload.initial_sub_resource_id, connection_id, &user.user_id, &user.username)
		.await
	{
		Ok(outcome) => {
			let room_id = RoomId::new(payload.resource_type.as_str(), payload.resource_uuid.as_str());
			subscriptions.subscribe(&state.bus, &room_id, connection_id, handle.outbox.clone()).await;

			handle.send(ServerEvent::RoomJoined(RoomJoinedPayload {
				room_id: room_id.clone(),
				members: outcome.join.members.iter().map(member_view).collect(),
				capacity: outcome.join.capacity,
				auto_lock: outcome.auto_lock,
			}));

			// The joiner's own member view, as inserted by `ResourceJoinService::join`
			// rather than reconstructed here, so broadcasts never drift from what
			// was actually stored (e.g. `currentSubResource` seeded from
			// `initialSubResourceId`).
			if let Some(member) = outcome.join.members.iter().find(|m| m.connection_id == *connection_id) {
				let _ = state
					.bus
					.broadcast_to_room(
						&room_id,
						ServerEvent::UserJoined(gateway_events::outbound::UserJoinedPayload {
							room_id: room_id.clone(),
							member: member_view(member),
						}),
					)
					.await;
				let _ = state
					.bus
					.broadcast_to_room(
						&room_id,
						ServerEvent::PresenceUpdated(gateway_events::outbound::PresenceUpdatedPayload {
							room_id: room_id.clone(),
							event_type: "user_joined",
							trigger_user_id: user.user_id.clone(),
							users: outcome.join.members.iter().map(member_view).collect(),
							timestamp: member.last_activity,
						}),
					)
					.await;
			}

			if outcome.join.crossed_warning_threshold {
				let _ = state
					.bus
					.broadcast_to_room(
						&room_id,
						ServerEvent::RoomCapacityWarning(gateway_events::outbound::RoomCapacityWarningPayload {
							room_id: room_id.clone(),
							capacity: outcome.join.capacity,
						}),
					)
					.await;
			}
			Ok(())
		}
		Err(GatewayError::RoomFull { current, max, .. }) => {
			handle.send(ServerEvent::RoomJoinRejected(gateway_events::outbound::RoomJoinRejectedPayload {
				room_id: RoomId::new(payload.resource_type.as_str(), payload.resource_uuid.as_str()),
				reason: "ROOM_FULL",
				capacity: gateway_events::views::CapacitySnapshot::new(current, max),
			}));
			Ok(())
		}
		Err(GatewayError::ResourceClosed { status }) => {
			handle.send(ServerEvent::ResourceJoinRejected(ResourceJoinRejectedPayload {
				resource_type: payload.resource_type,
				resource_uuid: payload.resource_uuid,
				reason: "RESOURCE_CLOSED",
				resource_status: Some(status),
			}));
			Ok(())
		}
		Err(err @ (GatewayError::UnsupportedResourceType(_) | GatewayError::InvalidResourceUuid | GatewayError::ResourceNotFound)) => {
			handle.send(ServerEvent::ResourceJoinRejected(ResourceJoinRejectedPayload {
				resource_type: payload.resource_type,
				resource_uuid: payload.resource_uuid,
				reason: err.error_code(),
				resource_status: None,
			}));
			Ok(())
		}
		Err(err) => Err(err),
	}
}

pub async fn leave(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, payload: ResourceLeavePayload) -> Result<()> {
	let room_id = RoomId::new(payload.resource_type.as_str(), payload.resource_uuid.as_str());
	leave_room(state, connection_id, user, subscriptions, &room_id).await
}
