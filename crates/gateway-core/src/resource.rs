//! Thin layer over [`crate::room`] that additionally consults the
//! [`crate::validator::ResourceValidator`] port and, on request, attempts to
//! auto-acquire an initial sub-resource lock (spec.md §4.3).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use gateway_events::views::AutoLockOutcome;
use gateway_events::{ConnectionId, ResourceType, ResourceUuid, RoomId, SubResourceId, UserId, Username};
use tracing::warn;

use crate::errors::{GatewayError, Result};
use crate::lock::LockManager;
use crate::room::{JoinOutcome, RoomMember, RoomRegistry};
use crate::validator::ResourceValidator;

/// Resource types the gateway recognizes on `resource:join`. Anything else
/// fails `UNSUPPORTED_RESOURCE_TYPE` before the validator is ever consulted.
#[derive(Debug, Clone)]
pub struct SupportedResourceTypes(HashSet<String>);

impl SupportedResourceTypes {
	#[must_use]
	pub fn new(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
		Self(types.into_iter().map(Into::into).collect())
	}

	#[must_use]
	pub fn contains(&self, resource_type: &str) -> bool {
		self.0.contains(resource_type)
	}
}

impl Default for SupportedResourceTypes {
	fn default() -> Self {
		Self::new(["surgery-management", "admin_panel", "chat"])
	}
}

/// Outcome of a successful `resource:join`, layering the autoLock result on
/// top of the plain room join outcome.
pub struct ResourceJoinOutcome {
	pub join: JoinOutcome,
	pub auto_lock: Option<AutoLockOutcome>,
}

#[derive(Clone)]
pub struct ResourceJoinService {
	rooms: RoomRegistry,
	locks: LockManager,
	validator: Arc<dyn ResourceValidator>,
	supported_types: Arc<SupportedResourceTypes>,
	auto_lock_enabled: bool,
}

impl ResourceJoinService {
	#[must_use]
	pub fn new(rooms: RoomRegistry, locks: LockManager, validator: Arc<dyn ResourceValidator>, supported_types: SupportedResourceTypes, auto_lock_enabled: bool) -> Self {
		Self {
			rooms,
			locks,
			validator,
			supported_types: Arc::new(supported_types),
			auto_lock_enabled,
		}
	}

	/// Validate and perform a typed `resource:join`, including the
	/// best-effort auto-lock of `initial_sub_resource_id` when present and
	/// enabled. Internal errors during auto-lock never fail the join itself.
	#[allow(clippy::too_many_arguments)]
	pub async fn join(
		&self,
		resource_type: &ResourceType,
		resource_uuid: &ResourceUuid,
		initial_sub_resource_id: Option<SubResourceId>,
		connection_id: &ConnectionId,
		user_id: &UserId,
		username: &Username,
	) -> Result<ResourceJoinOutcome> {
		if !self.supported_types.contains(resource_type.as_str()) {
			return Err(GatewayError::UnsupportedResourceType(resource_type.as_str().to_owned()));
		}
		if !is_canonical_uuid(resource_uuid.as_str()) {
			return Err(GatewayError::InvalidResourceUuid);
		}

		let record = self.validator.find_one(resource_type, resource_uuid).await.ok_or(GatewayError::ResourceNotFound)?;
		if !self.validator.is_resource_open(&record) {
			return Err(GatewayError::ResourceClosed { status: record.status });
		}

		let room_id = RoomId::new(resource_type.as_str(), resource_uuid.as_str());
		let now = Utc::now();
		let member = RoomMember {
			connection_id: connection_id.clone(),
			user_id: user_id.clone(),
			username: username.clone(),
			joined_at: now,
			current_sub_resource: initial_sub_resource_id.clone(),
			last_activity: now,
		};
		let join = self.rooms.join(&room_id, member).map_err(|err| match err {
			crate::room::JoinError::RoomFull { current, max } => GatewayError::RoomFull { room_id: room_id.as_str().to_owned(), current, max },
		})?;

		let auto_lock = if self.auto_lock_enabled {
			match initial_sub_resource_id {
				Some(sub_resource_id) => Some(self.attempt_auto_lock(resource_type, resource_uuid, sub_resource_id, connection_id, user_id, username).await),
				None => None,
			}
		} else {
			None
		};

		Ok(ResourceJoinOutcome { join, auto_lock })
	}

	async fn attempt_auto_lock(
		&self,
		resource_type: &ResourceType,
		resource_uuid: &ResourceUuid,
		sub_resource_id: SubResourceId,
		connection_id: &ConnectionId,
		user_id: &UserId,
		username: &Username,
	) -> AutoLockOutcome {
		match self.locks.acquire(resource_type, resource_uuid, &sub_resource_id, connection_id, user_id, username).await {
			Ok(outcome) => AutoLockOutcome {
				acquired: true,
				sub_resource_id,
				locked_at: Some(outcome.locked_at),
				denial_reason: None,
				locked_by: None,
			},
			Err(GatewayError::SubResourceAlreadyLocked) => {
				let lock_key = gateway_events::LockKey::new(&RoomId::new(resource_type.as_str(), resource_uuid.as_str()), &sub_resource_id);
				let locked_by = self.locks.lock_holder(&lock_key);
				AutoLockOutcome {
					acquired: false,
					sub_resource_id,
					locked_at: None,
					denial_reason: Some("SUBRESOURCE_ALREADY_LOCKED"),
					locked_by,
				}
			}
			Err(err) => {
				warn!(error = %err, "auto-lock failed during resource:join");
				AutoLockOutcome {
					acquired: false,
					sub_resource_id,
					locked_at: None,
					denial_reason: Some("INTERNAL_ERROR"),
					locked_by: None,
				}
			}
		}
	}
}

/// `resourceUuid` must be the canonical 8-4-4-4-12 hyphenated hex form; the
/// `uuid` crate's own parser is deliberately not reused here because it also
/// accepts braced/urn/simple forms the spec does not.
#[must_use]
pub fn is_canonical_uuid(value: &str) -> bool {
	let groups: Vec<&str> = value.split('-').collect();
	let expected_lengths = [8, 4, 4, 4, 12];
	if groups.len() != expected_lengths.len() {
		return false;
	}
	groups.iter().zip(expected_lengths).all(|(group, expected_len)| group.len() == expected_len && group.bytes().all(|b| b.is_ascii_hexdigit()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_canonical_form() {
		assert!(is_canonical_uuid("550e8400-e29b-41d4-a716-446655440000"));
	}

	#[test]
	fn rejects_braced_and_simple_forms() {
		assert!(!is_canonical_uuid("{550e8400-e29b-41d4-a716-446655440000}"));
		assert!(!is_canonical_uuid("550e8400e29b41d4a716446655440000"));
	}

	#[test]
	fn rejects_wrong_group_lengths() {
		assert!(!is_canonical_uuid("550e840-e29b-41d4-a716-446655440000"));
	}
}
