//! `room:join` / `room:leave` / `room:query_users`: plain room membership,
//! independent of the typed resource layer in [`super::resource`].

use chrono::Utc;
use gateway_core::{AuthenticatedUser, GatewayError, Result, RoomMember};
use gateway_events::inbound::{RoomJoinPayload, RoomLeavePayload, RoomQueryUsersPayload};
use gateway_events::outbound::{PresenceUpdatedPayload, RoomCapacityWarningPayload, RoomJoinRejectedPayload, RoomJoinedPayload, RoomLeftPayload, RoomUsersPayload, UserJoinedPayload, UserLeftPayload};
use gateway_events::{ConnectionId, ServerEvent};

use crate::state::AppState;
use crate::subscriptions::RoomSubscriptions;

use super::member_view;

pub async fn join(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, payload: RoomJoinPayload) -> Result<()> {
	if payload.room_id.as_str().is_empty() {
		return Err(GatewayError::InvalidRoomId);
	}
	let Some(handle) = state.connections.get(connection_id) else {
		return Err(GatewayError::Unauthenticated);
	};

	let now = Utc::now();
	let member = RoomMember {
		connection_id: connection_id.clone(),
		user_id: user.user_id.clone(),
		username: user.username.clone(),
		joined_at: now,
		current_sub_resource: None,
		last_activity: now,
	};

	match state.rooms.join(&payload.room_id, member.clone()) {
		Ok(outcome) => {
			subscriptions.subscribe(&state.bus, &payload.room_id, connection_id, handle.outbox.clone()).await;

			handle.send(ServerEvent::RoomJoined(RoomJoinedPayload {
				room_id: payload.room_id.clone(),
				members: outcome.members.iter().map(member_view).collect(),
				capacity: outcome.capacity,
				auto_lock: None,
			}));

			let _ = state
				.bus
				.broadcast_to_room(
					&payload.room_id,
					ServerEvent::UserJoined(UserJoinedPayload {
						room_id: payload.room_id.clone(),
						member: member_view(&member),
					}),
				)
				.await;
			let _ = state
				.bus
				.broadcast_to_room(
					&payload.room_id,
					ServerEvent::PresenceUpdated(PresenceUpdatedPayload {
						room_id: payload.room_id.clone(),
						event_type: "user_joined",
						trigger_user_id: user.user_id.clone(),
						users: outcome.members.iter().map(member_view).collect(),
						timestamp: now,
					}),
				)
				.await;

			if outcome.crossed_warning_threshold {
				let _ = state
					.bus
					.broadcast_to_room(
						&payload.room_id,
						ServerEvent::RoomCapacityWarning(RoomCapacityWarningPayload {
							room_id: payload.room_id.clone(),
							capacity: outcome.capacity,
						}),
					)
					.await;
			}
			Ok(())
		}
		Err(gateway_core::room::JoinError::RoomFull { current, max }) => {
			handle.send(ServerEvent::RoomJoinRejected(RoomJoinRejectedPayload {
				room_id: payload.room_id,
				reason: "ROOM_FULL",
				capacity: gateway_events::views::CapacitySnapshot::new(current, max),
			}));
			Ok(())
		}
	}
}

pub async fn leave(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, payload: RoomLeavePayload) -> Result<()> {
	leave_room(state, connection_id, user, subscriptions, &payload.room_id).await
}

pub(crate) async fn leave_room(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, subscriptions: &RoomSubscriptions, room_id: &gateway_events::RoomId) -> Result<()> {
	match state.rooms.leave(room_id, connection_id) {
		gateway_core::room::LeaveOutcome::Left { remaining_members } => {
			subscriptions.unsubscribe(room_id);
			if let Some(handle) = state.connections.get(connection_id) {
				handle.send(ServerEvent::RoomLeft(RoomLeftPayload { room_id: room_id.clone(), message: None }));
			}
			let _ = state
				.bus
				.broadcast_to_room(
					room_id,
					ServerEvent::UserLeft(UserLeftPayload {
						room_id: room_id.clone(),
						connection_id: connection_id.clone(),
						user_id: user.user_id.clone(),
						reason: "manual",
					}),
				)
				.await;
			let _ = state
				.bus
				.broadcast_to_room(
					room_id,
					ServerEvent::PresenceUpdated(PresenceUpdatedPayload {
						room_id: room_id.clone(),
						event_type: "user_left",
						trigger_user_id: user.user_id.clone(),
						users: remaining_members.iter().map(member_view).collect(),
						timestamp: Utc::now(),
					}),
				)
				.await;
			if remaining_members.is_empty() {
				state.bus.close_room(room_id).await;
			}
			Ok(())
		}
		// Idempotent: leaving a room you were never in is a success with an
		// advisory message, not an error.
		gateway_core::room::LeaveOutcome::NotAMember => {
			if let Some(handle) = state.connections.get(connection_id) {
				handle.send(ServerEvent::RoomLeft(RoomLeftPayload {
					room_id: room_id.clone(),
					message: Some("You were not in room"),
				}));
			}
			Ok(())
		}
	}
}

pub fn query_users(state: &AppState, connection_id: &ConnectionId, payload: RoomQueryUsersPayload) -> Result<()> {
	let Some(handle) = state.connections.get(connection_id) else {
		return Err(GatewayError::Unauthenticated);
	};
	let Some((members, _capacity)) = state.rooms.query(&payload.room_id) else {
		return Err(GatewayError::UserNotInRoom);
	};
	handle.send(ServerEvent::RoomUsers(RoomUsersPayload {
		room_id: payload.room_id,
		members: members.iter().map(member_view).collect(),
	}));
	Ok(())
}
