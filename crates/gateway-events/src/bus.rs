use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ids::{ResourceType, ResourceUuid, SubResourceId, UserId};

/// Payload of the in-process `resource.updated` feed (spec.md §4.7), published
/// by the REST API that owns resource mutations and consumed by the
/// fan-out listener that turns it into a [`crate::outbound::ResourceUpdatedPayload`]
/// broadcast to the matching room.
///
/// This is not part of the client-facing wire vocabulary: it never crosses a
/// WebSocket frame in this direction, only the in-process event bus.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdatedEvent {
	pub resource_type: ResourceType,
	pub resource_uuid: ResourceUuid,
	pub resource_revision_uuid: String,
	pub updated_by: String,
	pub updated_by_user_id: UserId,
	pub operation: String,
	#[serde(default)]
	pub sub_resource_type: Option<String>,
	#[serde(default)]
	pub sub_resource_id: Option<SubResourceId>,
	#[serde(default)]
	pub status: Option<String>,
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub changes_summary: Option<String>,
}
