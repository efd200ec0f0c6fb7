//! Connection registry: every admitted socket, indexed by `ConnectionId`
//! with a secondary index by `UserId`.
//!
//! Grounded on the teacher's `ConnectionStore`/`ConnectionHandle` pattern
//! (`DashMap`-backed store of cloneable handles, one per live connection),
//! but the handle here carries the gateway's authenticated identity and an
//! outbound channel for targeted replies instead of a generic
//! subscription/event-key actor.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_events::{ConnectionId, ServerEvent, UserId, Username};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Send-side of a connection's outbound frame channel. The websocket task
/// reading from the paired receiver is responsible for actually writing
/// frames; this crate never touches the socket directly.
pub type Outbox = mpsc::Sender<ServerEvent>;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
	pub user_id: UserId,
	pub username: Username,
	pub first_name: String,
	pub last_name: String,
	pub email: String,
	pub roles: Vec<String>,
}

/// A live, admitted connection.
#[derive(Clone)]
pub struct ConnectionHandle {
	pub connection_id: ConnectionId,
	pub user: AuthenticatedUser,
	pub connected_at: DateTime<Utc>,
	pub outbox: Outbox,
	pub cancel_token: CancellationToken,
}

impl ConnectionHandle {
	/// Best-effort direct delivery to this connection. A full or closed
	/// outbox just drops the event — the socket read loop, not this call,
	/// is what notices a dead connection and tears it down.
	pub fn send(&self, event: ServerEvent) {
		if self.outbox.try_send(event).is_err() {
			debug!(connection_id = %self.connection_id, "outbox full or closed, dropping event");
		}
	}
}

#[derive(Default)]
struct Inner {
	by_connection: DashMap<ConnectionId, ConnectionHandle>,
	by_user: DashMap<UserId, HashSet<ConnectionId>>,
}

/// Registry of every currently admitted connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
	inner: Arc<Inner>,
}

impl ConnectionRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, handle: ConnectionHandle) {
		let connection_id = handle.connection_id.clone();
		let user_id = handle.user.user_id.clone();
		self.inner.by_connection.insert(connection_id.clone(), handle);
		self.inner.by_user.entry(user_id).or_default().insert(connection_id);
	}

	#[must_use]
	pub fn get(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
		self.inner.by_connection.get(connection_id).map(|entry| entry.clone())
	}

	/// Remove a connection, returning it if it was present. Cancels its
	/// token so any outstanding per-connection tasks wind down.
	pub fn remove(&self, connection_id: &ConnectionId) -> Option<ConnectionHandle> {
		let (_, handle) = self.inner.by_connection.remove(connection_id)?;
		if let Some(mut ids) = self.inner.by_user.get_mut(&handle.user.user_id) {
			ids.remove(connection_id);
			if ids.is_empty() {
				drop(ids);
				self.inner.by_user.remove(&handle.user.user_id);
			}
		}
		handle.cancel_token.cancel();
		Some(handle)
	}

	#[must_use]
	pub fn connections_for_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
		self.inner.by_user.get(user_id).map(|ids| ids.iter().cloned().collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.by_connection.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.inner.by_connection.is_empty()
	}

	#[must_use]
	pub fn unique_user_count(&self) -> usize {
		self.inner.by_user.len()
	}

	/// Snapshot every connection. Used by the sweeper and the admin overview endpoints.
	#[must_use]
	pub fn snapshot(&self) -> Vec<ConnectionHandle> {
		self.inner.by_connection.iter().map(|entry| entry.value().clone()).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_handle(conn: ConnectionId, user_id: &str) -> ConnectionHandle {
		let (tx, _rx) = mpsc::channel(8);
		ConnectionHandle {
			connection_id: conn,
			user: AuthenticatedUser {
				user_id: UserId::new(user_id.to_owned()),
				username: Username::new("alice".to_owned()),
				first_name: "Alice".into(),
				last_name: "Doe".into(),
				email: "alice@example.com".into(),
				roles: vec![],
			},
			connected_at: Utc::now(),
			outbox: tx,
			cancel_token: CancellationToken::new(),
		}
	}

	#[test]
	fn indexes_by_user_and_connection() {
		let registry = ConnectionRegistry::new();
		let conn_a = ConnectionId::new();
		let conn_b = ConnectionId::new();
		registry.insert(test_handle(conn_a.clone(), "userA"));
		registry.insert(test_handle(conn_b.clone(), "userA"));

		assert_eq!(registry.len(), 2);
		assert_eq!(registry.connections_for_user(&UserId::new("userA".to_owned())).len(), 2);

		registry.remove(&conn_a);
		assert_eq!(registry.len(), 1);
		assert_eq!(registry.connections_for_user(&UserId::new("userA".to_owned())).len(), 1);
	}

	#[test]
	fn removing_last_connection_drops_user_index() {
		let registry = ConnectionRegistry::new();
		let conn = ConnectionId::new();
		registry.insert(test_handle(conn.clone(), "userA"));
		registry.remove(&conn);
		assert_eq!(registry.unique_user_count(), 0);
	}
}
