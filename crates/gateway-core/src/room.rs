//! Room registry: `roomId -> ordered set of members`, with per-resource-type
//! capacity limits and the 80/90%-style capacity-warning crossing used by
//! the join handler.
//!
//! Grounded on the same `DashMap`-backed store pattern as
//! [`crate::connection::ConnectionRegistry`], generalized from a flat set of
//! connection handles to a set of per-room member rosters.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gateway_events::views::CapacitySnapshot;
use gateway_events::{ConnectionId, RoomId, SubResourceId, UserId, Username};
use indexmap::IndexMap;

use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct RoomMember {
	pub connection_id: ConnectionId,
	pub user_id: UserId,
	pub username: Username,
	pub joined_at: DateTime<Utc>,
	pub current_sub_resource: Option<SubResourceId>,
	pub last_activity: DateTime<Utc>,
}

/// Per-resource-type room capacity, falling back to `default` for any
/// resource type not listed explicitly.
#[derive(Debug, Clone)]
pub struct RoomLimits {
	pub default: usize,
	pub per_resource_type: HashMap<String, usize>,
}

impl RoomLimits {
	#[must_use]
	pub fn capacity_for(&self, resource_type: &str) -> usize {
		self.per_resource_type.get(resource_type).copied().unwrap_or(self.default)
	}
}

impl Default for RoomLimits {
	fn default() -> Self {
		Self {
			default: 50,
			per_resource_type: HashMap::new(),
		}
	}
}

/// Fraction of capacity at which the whole room is warned.
pub const ROOM_CAPACITY_WARNING_PERCENT: u32 = 90;

struct Room {
	members: IndexMap<ConnectionId, RoomMember>,
	max_users: usize,
}

#[derive(Clone)]
pub struct RoomRegistry {
	rooms: Arc<DashMap<RoomId, Room>>,
	limits: Arc<RoomLimits>,
}

/// Outcome of a successful `join`, including whether this arrival crossed
/// the capacity-warning threshold (spec.md §4.2: emitted once per crossing,
/// not on every subsequent join above it).
pub struct JoinOutcome {
	pub members: Vec<RoomMember>,
	pub capacity: CapacitySnapshot,
	pub crossed_warning_threshold: bool,
}

pub enum JoinError {
	RoomFull { current: usize, max: usize },
}

pub enum LeaveOutcome {
	Left { remaining_members: Vec<RoomMember> },
	NotAMember,
}

impl RoomRegistry {
	#[must_use]
	pub fn new(limits: RoomLimits) -> Self {
		Self {
			rooms: Arc::new(DashMap::new()),
			limits: Arc::new(limits),
		}
	}

	pub fn join(&self, room_id: &RoomId, member: RoomMember) -> Result<JoinOutcome, JoinError> {
		let resource_type = room_id.split().map_or("default", |(rt, _)| rt);
		let max_users = self.limits.capacity_for(resource_type);

		let mut room = self.rooms.entry(room_id.clone()).or_insert_with(|| Room {
			members: IndexMap::new(),
			max_users,
		});

		let current = room.members.len();
		if current >= room.max_users {
			return Err(JoinError::RoomFull { current, max: room.max_users });
		}

		let was_below_warning = !crosses_threshold(current, room.max_users);
		room.members.insert(member.connection_id.clone(), member);
		let new_current = room.members.len();
		let crossed_warning_threshold = was_below_warning && crosses_threshold(new_current, room.max_users);

		Ok(JoinOutcome {
			members: room.members.values().cloned().collect(),
			capacity: CapacitySnapshot::new(new_current, room.max_users),
			crossed_warning_threshold,
		})
	}

	pub fn leave(&self, room_id: &RoomId, connection_id: &ConnectionId) -> LeaveOutcome {
		let Some(mut room) = self.rooms.get_mut(room_id) else {
			return LeaveOutcome::NotAMember;
		};
		if room.members.shift_remove(connection_id).is_none() {
			return LeaveOutcome::NotAMember;
		}
		let remaining_members = room.members.values().cloned().collect();
		let is_empty = room.members.is_empty();
		drop(room);
		if is_empty {
			self.rooms.remove(room_id);
		}
		LeaveOutcome::Left { remaining_members }
	}

	/// Remove a connection from every room it belongs to (disconnect cleanup).
	/// Returns `(roomId, remainingMembers)` for each room the connection left.
	#[must_use]
	pub fn leave_all(&self, connection_id: &ConnectionId) -> Vec<(RoomId, Vec<RoomMember>)> {
		let mut left = Vec::new();
		let room_ids: Vec<RoomId> = self.rooms.iter().filter(|r| r.members.contains_key(connection_id)).map(|r| r.key().clone()).collect();
		for room_id in room_ids {
			if let LeaveOutcome::Left { remaining_members } = self.leave(&room_id, connection_id) {
				left.push((room_id, remaining_members));
			}
		}
		left
	}

	#[must_use]
	pub fn query(&self, room_id: &RoomId) -> Option<(Vec<RoomMember>, CapacitySnapshot)> {
		self.rooms.get(room_id).map(|room| (room.members.values().cloned().collect(), CapacitySnapshot::new(room.members.len(), room.max_users)))
	}

	#[must_use]
	pub fn is_member(&self, room_id: &RoomId, connection_id: &ConnectionId) -> bool {
		self.rooms.get(room_id).is_some_and(|room| room.members.contains_key(connection_id))
	}

	/// Update a member's `currentSubResource` and `lastActivity`, returning
	/// the refreshed roster for the `presence:updated` broadcast.
	pub fn set_current_sub_resource(&self, room_id: &RoomId, connection_id: &ConnectionId, sub_resource: Option<SubResourceId>, now: DateTime<Utc>) -> Option<Vec<RoomMember>> {
		let mut room = self.rooms.get_mut(room_id)?;
		let member = room.members.get_mut(connection_id)?;
		member.current_sub_resource = sub_resource;
		member.last_activity = now;
		Some(room.members.values().cloned().collect())
	}

	/// Touch `lastActivity` for every membership this connection holds
	/// across every room (heartbeat handler, spec.md §4.6).
	pub fn touch_activity(&self, connection_id: &ConnectionId, at: DateTime<Utc>) {
		for mut room in self.rooms.iter_mut() {
			if let Some(member) = room.members.get_mut(connection_id) {
				member.last_activity = at;
			}
		}
	}

	/// Snapshot of every room member across the whole registry, used by the
	/// sweeper and the admin aggregation endpoints.
	#[must_use]
	pub fn snapshot_all(&self) -> Vec<(RoomId, RoomMember)> {
		self
			.rooms
			.iter()
			.flat_map(|room| {
				let room_id = room.key().clone();
				room.members.values().cloned().map(move |m| (room_id.clone(), m)).collect::<Vec<_>>()
			})
			.collect()
	}

	#[must_use]
	pub fn room_count(&self) -> usize {
		self.rooms.len()
	}
}

fn crosses_threshold(current: usize, max: usize) -> bool {
	if max == 0 {
		return true;
	}
	u32::try_from((current * 100) / max).unwrap_or(u32::MAX) >= ROOM_CAPACITY_WARNING_PERCENT
}

#[cfg(test)]
mod tests {
	use super::*;

	fn member(connection_id: ConnectionId, user: &str) -> RoomMember {
		let now = Utc::now();
		RoomMember {
			connection_id,
			user_id: UserId::new(user.to_owned()),
			username: Username::new(user.to_owned()),
			joined_at: now,
			current_sub_resource: None,
			last_activity: now,
		}
	}

	#[test]
	fn rejects_join_at_capacity() {
		let registry = RoomRegistry::new(RoomLimits { default: 2, per_resource_type: HashMap::new() });
		let room_id = RoomId::new("x", "y");
		registry.join(&room_id, member(ConnectionId::new(), "a")).unwrap();
		registry.join(&room_id, member(ConnectionId::new(), "b")).unwrap();
		match registry.join(&room_id, member(ConnectionId::new(), "c")) {
			Err(JoinError::RoomFull { current, max }) => {
				assert_eq!(current, 2);
				assert_eq!(max, 2);
			}
			Ok(_) => panic!("expected room full"),
		}
	}

	#[test]
	fn warning_threshold_crosses_once() {
		let registry = RoomRegistry::new(RoomLimits { default: 10, per_resource_type: HashMap::new() });
		let room_id = RoomId::new("x", "y");
		let mut crossed_count = 0;
		for i in 0..9 {
			let outcome = registry.join(&room_id, member(ConnectionId::new(), &format!("u{i}"))).unwrap();
			if outcome.crossed_warning_threshold {
				crossed_count += 1;
			}
		}
		assert_eq!(crossed_count, 1, "90% of 10 should cross exactly once, at the 9th member");
	}

	#[test]
	fn leaving_empties_room_entry() {
		let registry = RoomRegistry::new(RoomLimits::default());
		let room_id = RoomId::new("x", "y");
		let conn = ConnectionId::new();
		registry.join(&room_id, member(conn.clone(), "a")).unwrap();
		registry.leave(&room_id, &conn);
		assert_eq!(registry.room_count(), 0);
	}

	#[test]
	fn leave_is_idempotent_for_non_member() {
		let registry = RoomRegistry::new(RoomLimits::default());
		let room_id = RoomId::new("x", "y");
		assert!(matches!(registry.leave(&room_id, &ConnectionId::new()), LeaveOutcome::NotAMember));
	}
}
