//! `resource:subresource_lock` (acquire) / `unlock` / `lock:extend` and the
//! three-phase forced-transfer protocol (`force_request` / `force_response`).
//! [`gateway_core::LockManager`] owns the bookkeeping and timers; this module
//! is the thin translation from inbound payload to manager call, plus the
//! one reply [`gateway_core::LockManager::acquire`] can't send itself: the
//! denial reply naming the current holder.

use gateway_core::{AuthenticatedUser, GatewayError, Result};
use gateway_events::inbound::{ForceRequestPayload, ForceResponsePayload, SubResourceTargetPayload};
use gateway_events::outbound::LockExtendedPayload;
use gateway_events::{ConnectionId, LockKey, RoomId, ServerEvent};

use crate::state::AppState;

pub async fn acquire(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, payload: SubResourceTargetPayload) -> Result<()> {
	match state
		.locks
		.acquire(&payload.resource_type, &payload.resource_uuid, &payload.sub_resource_id, connection_id, &user.user_id, &user.username)
		.await
	{
		Ok(_) => Ok(()),
		Err(GatewayError::SubResourceAlreadyLocked) => {
			let Some(handle) = state.connections.get(connection_id) else {
				return Err(GatewayError::Unauthenticated);
			};
			let room_id = RoomId::new(payload.resource_type.as_str(), payload.resource_uuid.as_str());
			let lock_key = LockKey::new(&room_id, &payload.sub_resource_id);
			let holder = state.locks.lock_holder(&lock_key).ok_or(GatewayError::LockNotFound)?;
			handle.send(state.locks.deny(holder, payload.sub_resource_id));
			Ok(())
		}
		Err(err) => Err(err),
	}
}

pub async fn release(state: &AppState, connection_id: &ConnectionId, payload: SubResourceTargetPayload) -> Result<()> {
	// LockManager::release already replies `lock_released` to the holder and
	// broadcasts `subresource:unlocked` to the room; nothing left to send here.
	state.locks.release(&payload.resource_type, &payload.resource_uuid, &payload.sub_resource_id, connection_id).await
}

pub async fn extend(state: &AppState, connection_id: &ConnectionId, payload: SubResourceTargetPayload) -> Result<()> {
	let expires_at = state.locks.extend(&payload.resource_type, &payload.resource_uuid, &payload.sub_resource_id, connection_id).await?;
	if let Some(handle) = state.connections.get(connection_id) {
		handle.send(ServerEvent::LockExtended(LockExtendedPayload {
			sub_resource_id: payload.sub_resource_id,
			expires_at,
		}));
	}
	Ok(())
}

pub async fn force_request(state: &AppState, connection_id: &ConnectionId, user: &AuthenticatedUser, payload: ForceRequestPayload) -> Result<()> {
	state
		.locks
		.force_request(&payload.resource_type, &payload.resource_uuid, &payload.sub_resource_id, connection_id, &user.user_id, &user.username, payload.message)
		.await
}

pub async fn force_response(state: &AppState, connection_id: &ConnectionId, payload: ForceResponsePayload) -> Result<()> {
	let approved = payload.approved;
	state.locks.force_response(&payload.request_id, approved, payload.message, connection_id).await?;
	if approved {
		state.metrics.force_transfers_approved.inc();
	} else {
		state.metrics.force_transfers_rejected.inc();
	}
	Ok(())
}
