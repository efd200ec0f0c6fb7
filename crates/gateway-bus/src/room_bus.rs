//! Gateway-specific pub/sub built on [`crate::inmem::InMemTransport`].
//!
//! Two independent channels ride the same transport primitive:
//!
//! - a per-room broadcast channel, opened lazily on first join and closed
//!   when a room empties, fanning out [`ServerEvent`] to every member;
//! - a single process-wide channel carrying `resource:updated` events from
//!   whatever external system owns the underlying resources.
//!
//! Both are in-process only: this gateway runs as one logical process, so
//! there is no need for the NATS-backed distributed transport the rest of
//! this crate's `Transport` trait was originally built to support.

use gateway_events::{ResourceUpdatedEvent, RoomId, ServerEvent};

use crate::inmem::InMemTransport;
use crate::receiver::TransportReceiver;
use crate::traits::Transport;
use crate::{inmem::InMemReceiver, TransportError};

const ROOM_CHANNEL_BUFFER: usize = 256;
const RESOURCE_UPDATE_BUFFER: usize = 256;

pub type RoomReceiver = TransportReceiver<ServerEvent, InMemReceiver<ServerEvent>>;
pub type ResourceUpdateReceiver = TransportReceiver<ResourceUpdatedEvent, InMemReceiver<ResourceUpdatedEvent>>;

/// Handle shared across the connection dispatcher for room fan-out and the
/// external resource-update feed.
#[derive(Clone)]
pub struct RoomBus {
	rooms: InMemTransport<ServerEvent>,
	resource_updates: InMemTransport<ResourceUpdatedEvent>,
}

impl Default for RoomBus {
	fn default() -> Self {
		Self::new()
	}
}

impl RoomBus {
	#[must_use]
	pub fn new() -> Self {
		Self {
			rooms: InMemTransport::new(ROOM_CHANNEL_BUFFER),
			resource_updates: InMemTransport::new(RESOURCE_UPDATE_BUFFER),
		}
	}

	/// Subscribe to a room's broadcast channel, opening it if this is the first subscriber.
	pub async fn join_room(&self, room_id: &RoomId) -> RoomReceiver {
		self.rooms.open_channel(room_id.as_str()).await
	}

	/// Drop a room's channel. Harmless if nobody is listening; the dispatcher
	/// calls this once a room's member count reaches zero.
	pub async fn close_room(&self, room_id: &RoomId) {
		let _ = self.rooms.close_channel(room_id.as_str()).await;
	}

	/// Fan an event out to every current subscriber of a room.
	///
	/// # Errors
	///
	/// Returns [`TransportError::ConnectionNotFound`] if the room has no open channel.
	pub async fn broadcast_to_room(&self, room_id: &RoomId, event: ServerEvent) -> Result<(), TransportError> {
		self.rooms.send(room_id.as_str(), event).await
	}

	#[must_use]
	pub fn room_count(&self) -> usize {
		self.rooms.active_channels()
	}

	/// Subscribe to the process-wide raw `resource.updated` feed (spec.md §4.7).
	/// The fan-out listener is the sole subscriber in practice; this stays a
	/// broadcast rather than a point-to-point queue so a second in-process
	/// consumer (e.g. an audit log) could attach without the listener's
	/// knowledge.
	pub async fn subscribe_resource_updates(&self) -> ResourceUpdateReceiver {
		self.resource_updates.subscribe().await
	}

	/// Publish a raw `resource.updated` event onto the in-process bus, for
	/// whatever external system owns resource mutations to call.
	///
	/// # Errors
	///
	/// Returns [`TransportError::BroadcastFailed`] if the underlying channel rejects the send.
	pub async fn publish_resource_update(&self, event: ResourceUpdatedEvent) -> Result<usize, TransportError> {
		self.resource_updates.broadcast(event).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use gateway_events::outbound::{RoomLeftPayload, ServerEvent};
	use gateway_events::{ResourceType, ResourceUuid, UserId};

	fn sample_event(room_id: &RoomId) -> ServerEvent {
		ServerEvent::RoomLeft(RoomLeftPayload { room_id: room_id.clone(), message: None })
	}

	fn sample_resource_update() -> ResourceUpdatedEvent {
		ResourceUpdatedEvent {
			resource_type: ResourceType::new("surgery-management"),
			resource_uuid: ResourceUuid::new("abc"),
			resource_revision_uuid: "rev-1".to_owned(),
			updated_by: "Dr. Alice".to_owned(),
			updated_by_user_id: UserId::new("user-1"),
			operation: "update".to_owned(),
			sub_resource_type: None,
			sub_resource_id: None,
			status: None,
			timestamp: Utc::now(),
			changes_summary: None,
		}
	}

	#[tokio::test]
	async fn room_broadcast_reaches_subscriber() {
		let bus = RoomBus::new();
		let room = RoomId::new("surgery-management", "abc");
		let mut rx = bus.join_room(&room).await;

		bus.broadcast_to_room(&room, sample_event(&room)).await.unwrap();

		let received = rx.recv().await.unwrap();
		assert!(matches!(received, ServerEvent::RoomLeft(_)));
	}

	#[tokio::test]
	async fn broadcasting_to_unopened_room_errors() {
		let bus = RoomBus::new();
		let room = RoomId::new("surgery-management", "never-joined");
		let result = bus.broadcast_to_room(&room, sample_event(&room)).await;
		assert!(matches!(result, Err(TransportError::ConnectionNotFound(_))));
	}

	#[tokio::test]
	async fn resource_updates_are_process_wide() {
		let bus = RoomBus::new();
		let mut rx1 = bus.subscribe_resource_updates().await;
		let mut rx2 = bus.subscribe_resource_updates().await;

		bus.publish_resource_update(sample_resource_update()).await.unwrap();

		assert!(rx1.recv().await.is_ok());
		assert!(rx2.recv().await.is_ok());
	}
}
