use serde::{Deserialize, Serialize};

use crate::ids::{ResourceType, ResourceUuid, RoomId, SubResourceId};

/// Messages accepted from a connected client, framed on the wire as
/// `{"event": "...", "payload": {...}}`.
///
/// Legacy `surgery:*` names are not modeled here: the dispatcher recognizes
/// them by raw event name and rewrites them onto [`ResourceJoin`] /
/// [`ResourceLeave`] / [`SubResourceLock`] / [`SubResourceUnlock`] with
/// `resourceType` pinned to `"surgery-management"` before this enum ever sees
/// the frame, so one handler path serves both vocabularies.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
	#[serde(rename = "room:join")]
	RoomJoin(RoomJoinPayload),

	#[serde(rename = "room:leave")]
	RoomLeave(RoomLeavePayload),

	#[serde(rename = "room:query_users")]
	RoomQueryUsers(RoomQueryUsersPayload),

	#[serde(rename = "resource:join")]
	ResourceJoin(ResourceJoinPayload),

	#[serde(rename = "resource:leave")]
	ResourceLeave(ResourceLeavePayload),

	#[serde(rename = "resource:subresource_lock")]
	SubResourceLock(SubResourceTargetPayload),

	#[serde(rename = "resource:subresource_unlock")]
	SubResourceUnlock(SubResourceTargetPayload),

	#[serde(rename = "lock:extend")]
	LockExtend(SubResourceTargetPayload),

	#[serde(rename = "resource:subresource_lock:force_request")]
	ForceRequest(ForceRequestPayload),

	#[serde(rename = "resource:subresource_lock:force_response")]
	ForceResponse(ForceResponsePayload),

	#[serde(rename = "presence:set_current_subresource")]
	SetCurrentSubResource(SetCurrentSubResourcePayload),

	#[serde(rename = "user:heartbeat")]
	Heartbeat(HeartbeatPayload),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinPayload {
	pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeavePayload {
	pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomQueryUsersPayload {
	pub room_id: RoomId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceJoinPayload {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	#[serde(default)]
	pub initial_sub_resource_id: Option<SubResourceId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLeavePayload {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
}

/// Shape shared by `subresource_lock` (acquire), `subresource_unlock`
/// (release) and `lock:extend`: all three name the same sub-resource target.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubResourceTargetPayload {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	pub sub_resource_id: SubResourceId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceRequestPayload {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	pub sub_resource_id: SubResourceId,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceResponsePayload {
	pub request_id: String,
	pub approved: bool,
	#[serde(default)]
	pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentSubResourcePayload {
	pub room_id: RoomId,
	/// `None` clears the member's current sub-resource.
	#[serde(default)]
	pub sub_resource_type: Option<SubResourceId>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
	/// Client-reported activity timestamp; defaults to server `now` when
	/// absent (spec.md §4.6).
	#[serde(default)]
	pub last_activity: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn decodes_room_join() {
		let raw = r#"{"event":"room:join","payload":{"roomId":"surgery-management:abc"}}"#;
		let event: ClientEvent = serde_json::from_str(raw).unwrap();
		match event {
			ClientEvent::RoomJoin(p) => assert_eq!(p.room_id.as_str(), "surgery-management:abc"),
			other => panic!("unexpected variant: {other:?}"),
		}
	}

	#[test]
	fn decodes_force_response() {
		let raw = r#"{"event":"resource:subresource_lock:force_response","payload":{"requestId":"r1","approved":true}}"#;
		let event: ClientEvent = serde_json::from_str(raw).unwrap();
		match event {
			ClientEvent::ForceResponse(p) => {
				assert_eq!(p.request_id, "r1");
				assert!(p.approved);
			}
			other => panic!("unexpected variant: {other:?}"),
		}
	}
}
