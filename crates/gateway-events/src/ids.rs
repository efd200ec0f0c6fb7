use std::{fmt, sync::Arc};
use uuid::Uuid;

/// Server-assigned opaque connection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}

	#[must_use]
	pub fn as_string(&self) -> String {
		self.0.to_string()
	}
}

impl Default for ConnectionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identity of a `ForceRequest`, server-assigned and unique across the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Uuid);

impl RequestId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for RequestId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

macro_rules! interned_string_id {
	($name:ident) => {
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
		pub struct $name(Arc<str>);

		impl $name {
			pub fn new(value: impl Into<Arc<str>>) -> Self {
				Self(value.into())
			}

			#[must_use]
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<String> for $name {
			fn from(value: String) -> Self {
				Self::new(value)
			}
		}

		impl From<&str> for $name {
			fn from(value: &str) -> Self {
				Self::new(value.to_owned())
			}
		}

		impl serde::Serialize for $name {
			fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
			where
				S: serde::Serializer,
			{
				serializer.serialize_str(&self.0)
			}
		}

		impl<'de> serde::Deserialize<'de> for $name {
			fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
			where
				D: serde::Deserializer<'de>,
			{
				let s = String::deserialize(deserializer)?;
				Ok(Self::new(s))
			}
		}
	};
}

interned_string_id!(UserId);
interned_string_id!(Username);
interned_string_id!(ResourceType);
interned_string_id!(ResourceUuid);
interned_string_id!(SubResourceId);

/// `roomId = "{resourceType}:{uuid}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(Arc<str>);

impl RoomId {
	#[must_use]
	pub fn new(resource_type: &str, uuid: &str) -> Self {
		Self(format!("{resource_type}:{uuid}").into())
	}

	/// Accept an already-composed `"type:uuid"` id as given by a client on generic `room:*` events.
	pub fn from_raw(raw: impl Into<Arc<str>>) -> Self {
		Self(raw.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Split back into `(resourceType, uuid)` if the id has the canonical shape.
	#[must_use]
	pub fn split(&self) -> Option<(&str, &str)> {
		self.0.split_once(':')
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl serde::Serialize for RoomId {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> serde::Deserialize<'de> for RoomId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(Self::from_raw(s))
	}
}

/// `lockKey = "{resourceType}:{uuid}:{subResourceId}"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey(Arc<str>);

impl LockKey {
	#[must_use]
	pub fn new(room_id: &RoomId, sub_resource_id: &SubResourceId) -> Self {
		Self(format!("{room_id}:{sub_resource_id}").into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for LockKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl serde::Serialize for LockKey {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		serializer.serialize_str(&self.0)
	}
}

impl<'de> serde::Deserialize<'de> for LockKey {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Ok(Self(s.into()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn room_id_formats_canonically() {
		let room = RoomId::new("surgery-management", "abc-123");
		assert_eq!(room.as_str(), "surgery-management:abc-123");
		assert_eq!(room.split(), Some(("surgery-management", "abc-123")));
	}

	#[test]
	fn lock_key_nests_room_id() {
		let room = RoomId::new("surgery-management", "abc-123");
		let sub = SubResourceId::new("data-tab");
		let key = LockKey::new(&room, &sub);
		assert_eq!(key.as_str(), "surgery-management:abc-123:data-tab");
	}
}
