use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SocketError;
use crate::ids::{ConnectionId, LockKey, ResourceType, ResourceUuid, RoomId, SubResourceId, UserId, Username};
use crate::views::{AutoLockOutcome, CapacitySnapshot, LockHolderView, PublicUser, RoomMemberView};

/// Messages the server emits, framed identically to [`crate::inbound::ClientEvent`]:
/// `{"event": "...", "payload": {...}}`. Some variants are sent to a single
/// connection (a direct reply or a targeted notification), others are
/// broadcast to every member of a room; the dispatcher, not this type,
/// decides the fan-out.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum ServerEvent {
	#[serde(rename = "authenticated")]
	Authenticated(AuthenticatedPayload),

	#[serde(rename = "connection:warning")]
	ConnectionWarning(ConnectionWarningPayload),

	#[serde(rename = "connection:rejected")]
	ConnectionRejected(ConnectionRejectedPayload),

	#[serde(rename = "connection:banned")]
	ConnectionBanned(ConnectionBannedPayload),

	#[serde(rename = "rate_limit_exceeded")]
	RateLimitExceeded(RateLimitExceededPayload),

	#[serde(rename = "socket:error")]
	SocketError(SocketError),

	#[serde(rename = "server:shutdown")]
	ServerShutdown(ServerShutdownPayload),

	#[serde(rename = "room:joined")]
	RoomJoined(RoomJoinedPayload),

	#[serde(rename = "room:left")]
	RoomLeft(RoomLeftPayload),

	#[serde(rename = "room:join_rejected")]
	RoomJoinRejected(RoomJoinRejectedPayload),

	#[serde(rename = "room:users")]
	RoomUsers(RoomUsersPayload),

	#[serde(rename = "room:capacity_warning")]
	RoomCapacityWarning(RoomCapacityWarningPayload),

	#[serde(rename = "user_joined")]
	UserJoined(UserJoinedPayload),

	#[serde(rename = "user_left")]
	UserLeft(UserLeftPayload),

	#[serde(rename = "presence:updated")]
	PresenceUpdated(PresenceUpdatedPayload),

	#[serde(rename = "resource:join_rejected")]
	ResourceJoinRejected(ResourceJoinRejectedPayload),

	#[serde(rename = "resource:updated")]
	ResourceUpdated(ResourceUpdatedPayload),

	#[serde(rename = "subresource:lock_acquired")]
	LockAcquired(LockAcquiredPayload),

	#[serde(rename = "subresource:lock_denied")]
	LockDenied(LockDeniedPayload),

	#[serde(rename = "subresource:locked")]
	LockBroadcast(LockBroadcastPayload),

	#[serde(rename = "subresource:lock_released")]
	LockReleased(LockReleasedPayload),

	#[serde(rename = "subresource:unlocked")]
	UnlockBroadcast(UnlockBroadcastPayload),

	#[serde(rename = "lock:released")]
	LockReleasedBroadcast(LockReleasedBroadcastPayload),

	#[serde(rename = "lock:extended")]
	LockExtended(LockExtendedPayload),

	#[serde(rename = "lock:expiring_soon")]
	LockExpiringSoon(LockExpiringSoonPayload),

	#[serde(rename = "lock:expired")]
	LockExpired(LockExpiredPayload),

	#[serde(rename = "resource:subresource_lock:force_request_received")]
	ForceRequestReceived(ForceRequestReceivedPayload),

	#[serde(rename = "resource:subresource_lock:force_request_pending")]
	ForceRequestPending(ForceRequestPendingPayload),

	#[serde(rename = "resource:subresource_lock:force_request_approved")]
	ForceRequestApproved(ForceRequestApprovedPayload),

	#[serde(rename = "resource:subresource_lock:force_request_rejected")]
	ForceRequestRejected(ForceRequestRejectedPayload),

	#[serde(rename = "resource:subresource_lock:force_request_timed_out")]
	ForceRequestTimedOut(ForceRequestTimedOutPayload),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedPayload {
	pub success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub socket_id: Option<ConnectionId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user: Option<PublicUser>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionWarningPayload {
	pub limit: usize,
	pub current: usize,
	pub percentage_used: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRejectedPayload {
	pub reason: &'static str,
	pub limit: usize,
	pub current: usize,
	pub retry_after: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionBannedPayload {
	pub reason: &'static str,
	pub banned_until: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceededPayload {
	pub event_name: String,
	pub limit: usize,
	pub window: u64,
	pub violations: u32,
	pub retry_after: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerShutdownPayload {
	pub reason: &'static str,
	pub grace_period_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedPayload {
	pub room_id: RoomId,
	pub members: Vec<RoomMemberView>,
	pub capacity: CapacitySnapshot,
	/// Present only on the typed `resource:join` path (spec.md §4.3); absent
	/// on a plain `room:join`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub auto_lock: Option<AutoLockOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeftPayload {
	pub room_id: RoomId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinRejectedPayload {
	pub room_id: RoomId,
	pub reason: &'static str,
	pub capacity: CapacitySnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUsersPayload {
	pub room_id: RoomId,
	pub members: Vec<RoomMemberView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCapacityWarningPayload {
	pub room_id: RoomId,
	pub capacity: CapacitySnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedPayload {
	pub room_id: RoomId,
	pub member: RoomMemberView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
	pub room_id: RoomId,
	pub connection_id: ConnectionId,
	pub user_id: UserId,
	pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdatedPayload {
	pub room_id: RoomId,
	pub event_type: &'static str,
	pub trigger_user_id: UserId,
	pub users: Vec<RoomMemberView>,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceJoinRejectedPayload {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	pub reason: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resource_status: Option<String>,
}

/// Fan-out of an externally-driven `resource.updated` bus event (spec.md §4.7)
/// to every member of the matching room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdatedPayload {
	pub room_id: RoomId,
	pub resource_type: ResourceType,
	pub resource_id: ResourceUuid,
	pub new_revision_id: String,
	pub updated_by: String,
	pub updated_by_user_id: UserId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sub_resource_id: Option<SubResourceId>,
	pub timestamp: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub changes_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockAcquiredPayload {
	pub lock_key: LockKey,
	pub sub_resource_id: SubResourceId,
	pub locked_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockDeniedPayload {
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
	pub held_by: LockHolderView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockBroadcastPayload {
	pub room_id: RoomId,
	pub sub_resource_id: SubResourceId,
	pub held_by: LockHolderView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockReleasedPayload {
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockBroadcastPayload {
	pub room_id: RoomId,
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
}

/// The unified `lock:released` broadcast (spec.md §4.4/§4.6), distinct from
/// the legacy `subresource:unlocked` room broadcast and from the targeted
/// `subresource:lock_released` reply: this one always goes to the whole
/// room and always carries the former holder's identity, used on disconnect
/// and inactivity-sweep releases.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockReleasedBroadcastPayload {
	pub room_id: RoomId,
	pub sub_resource_id: SubResourceId,
	pub user_id: UserId,
	pub username: Username,
	pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockExtendedPayload {
	pub sub_resource_id: SubResourceId,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockExpiringSoonPayload {
	pub sub_resource_id: SubResourceId,
	pub expires_at: DateTime<Utc>,
	pub seconds_remaining: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockExpiredPayload {
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestReceivedPayload {
	pub request_id: String,
	pub sub_resource_id: SubResourceId,
	pub requested_by: PublicUser,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestPendingPayload {
	pub request_id: String,
	pub sub_resource_id: SubResourceId,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestApprovedPayload {
	pub request_id: String,
	pub sub_resource_id: SubResourceId,
	pub lock_key: LockKey,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestRejectedPayload {
	pub request_id: String,
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Auto-reject of a pending force-transfer request, for any reason the
/// request never reached an explicit `force_response`: the 30-second
/// timeout, the holder disconnecting, or the holder releasing the lock
/// manually before responding.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestTimedOutPayload {
	pub request_id: String,
	pub sub_resource_id: SubResourceId,
	pub reason: &'static str,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::views::CapacitySnapshot;

	#[test]
	fn tags_and_contents_are_adjacent() {
		let event = ServerEvent::RoomLeft(RoomLeftPayload { room_id: RoomId::new("surgery-management", "abc"), message: None });
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["event"], "room:left");
		assert_eq!(json["payload"]["roomId"], "surgery-management:abc");
	}

	#[test]
	fn capacity_snapshot_rounds_percentage() {
		let capacity = CapacitySnapshot::new(8, 10);
		assert_eq!(capacity.percentage_used, 80);
	}
}
