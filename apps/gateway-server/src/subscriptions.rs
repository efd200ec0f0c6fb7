//! Per-connection room fan-out: bridges [`gateway_bus::RoomBus`]'s room
//! broadcast channels onto a single connection's own outbox.
//!
//! Grounded on the teacher's `websocket/connection/subscription.rs`
//! per-client subscription bookkeeping (a map of active subscriptions each
//! torn down independently on unsubscribe or disconnect), adapted from
//! NATS subject subscriptions to room-broadcast receivers: joining a room
//! spawns one forwarder task relaying that room's broadcast events onto the
//! connection's outbox; leaving cancels it.

use dashmap::DashMap;
use gateway_core::Outbox;
use gateway_events::{ConnectionId, RoomId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
pub struct RoomSubscriptions {
	forwarders: DashMap<RoomId, CancellationToken>,
}

impl RoomSubscriptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Start relaying `room_id`'s broadcast channel onto `outbox`. A second
	/// subscribe for the same room replaces the first forwarder rather than
	/// stacking a duplicate.
	pub async fn subscribe(&self, bus: &gateway_bus::RoomBus, room_id: &RoomId, connection_id: &ConnectionId, outbox: Outbox) {
		self.unsubscribe(room_id);
		let mut room_rx = bus.join_room(room_id).await;
		let token = CancellationToken::new();
		let child = token.clone();
		let connection_id = connection_id.clone();
		tokio::spawn(async move {
			loop {
				tokio::select! {
					() = child.cancelled() => break,
					received = room_rx.recv() => {
						match received {
							Ok(event) => {
								if outbox.try_send(event).is_err() {
									debug!(%connection_id, "outbox full or closed, dropping room broadcast");
								}
							}
							Err(_) => break,
						}
					}
				}
			}
		});
		self.forwarders.insert(room_id.clone(), token);
	}

	pub fn unsubscribe(&self, room_id: &RoomId) {
		if let Some((_, token)) = self.forwarders.remove(room_id) {
			token.cancel();
		}
	}

	pub fn unsubscribe_all(&self) {
		for entry in self.forwarders.iter() {
			entry.value().cancel();
		}
		self.forwarders.clear();
	}
}
