use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{ConnectionId, ResourceType, ResourceUuid, SubResourceId, UserId, Username};

/// Public projection of `AuthenticatedUser`, sent back on the `authenticated` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
	pub user_id: UserId,
	pub username: Username,
	pub first_name: String,
	pub last_name: String,
	pub email: String,
	pub roles: Vec<String>,
}

/// A room roster entry, as seen by other members of the room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMemberView {
	pub connection_id: ConnectionId,
	pub user_id: UserId,
	pub username: Username,
	pub joined_at: DateTime<Utc>,
	pub current_sub_resource: Option<SubResourceId>,
	pub last_activity: DateTime<Utc>,
}

/// Who currently holds a sub-resource lock, as surfaced to a denied challenger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolderView {
	pub user_id: UserId,
	pub username: Username,
	pub locked_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacitySnapshot {
	pub current: usize,
	pub max: usize,
	pub percentage_used: u8,
}

impl CapacitySnapshot {
	#[must_use]
	pub fn new(current: usize, max: usize) -> Self {
		let percentage_used = if max == 0 { 100 } else { ((current * 100) / max).min(100) as u8 };
		Self { current, max, percentage_used }
	}
}

/// The `autoLock` field carried on a successful `resource:join` response (spec.md §4.3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoLockOutcome {
	pub acquired: bool,
	pub sub_resource_id: SubResourceId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locked_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub denial_reason: Option<&'static str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub locked_by: Option<LockHolderView>,
}

/// Identity of the parent resource a room corresponds to, used on the
/// `resource:updated` fan-out and the `resource:join`/`leave` handlers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
}
