//! Sub-resource lock manager: mutual exclusion with bounded hold times,
//! expiry warnings, extensions, and a three-phase forced-transfer protocol.
//!
//! Grounded on the same `Arc<DashMap<..>>` + cloneable-handle shape used
//! throughout this crate, generalized here to hold not just state but the
//! scheduled timer tasks that mutate it. Each lock's warning and expiry
//! timers are collapsed into one spawned task per lock, cancelled as a unit
//! via a single `CancellationToken`; extending or releasing a lock cancels
//! that token and (for extend) starts a fresh one, matching the "cancel
//! both timers" contract spec.md §4.4 describes as two independent
//! deadlines.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gateway_events::outbound::{
	ForceRequestApprovedPayload, ForceRequestPendingPayload, ForceRequestReceivedPayload, ForceRequestRejectedPayload, ForceRequestTimedOutPayload, LockAcquiredPayload, LockBroadcastPayload,
	LockDeniedPayload, LockExpiredPayload, LockExpiringSoonPayload, LockReleasedBroadcastPayload, LockReleasedPayload, UnlockBroadcastPayload,
};
use gateway_events::views::LockHolderView;
use gateway_events::{ConnectionId, LockKey, RequestId, ResourceType, ResourceUuid, RoomId, ServerEvent, SubResourceId, UserId, Username};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::ConnectionRegistry;
use crate::errors::{GatewayError, Result};
use crate::room::RoomRegistry;

/// Default hold time for a freshly acquired or extended lock.
pub const LOCK_TTL: Duration = Duration::from_secs(3 * 3600);
/// How long before expiry the holder is warned.
pub const WARNING_BEFORE: Duration = Duration::from_secs(15 * 60);
/// How long a force-transfer request waits for the holder's response.
pub const FORCE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Lock {
	pub holder_connection_id: ConnectionId,
	pub holder_user_id: UserId,
	pub holder_username: Username,
	pub locked_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl Lock {
	fn holder_view(&self) -> LockHolderView {
		LockHolderView {
			user_id: self.holder_user_id.clone(),
			username: self.holder_username.clone(),
			locked_at: self.locked_at,
			expires_at: self.expires_at,
		}
	}
}

struct LockEntry {
	lock: Lock,
	room_id: RoomId,
	timer_token: CancellationToken,
}

/// A lock table entry after it has been torn down, carrying everything a
/// release path's event emission needs without re-reading the map.
struct RemovedLock {
	room_id: RoomId,
	sub_resource_id: SubResourceId,
	holder_connection_id: ConnectionId,
	holder_user_id: UserId,
	holder_username: Username,
}

#[derive(Clone)]
struct ForceRequest {
	request_id: RequestId,
	lock_key: LockKey,
	room_id: RoomId,
	sub_resource_id: SubResourceId,
	requester_connection_id: ConnectionId,
	requester_user_id: UserId,
	requester_username: Username,
	message: Option<String>,
	timeout_token: CancellationToken,
}

struct Inner {
	locks: DashMap<LockKey, LockEntry>,
	pending_by_lock: DashMap<LockKey, RequestId>,
	pending_requests: DashMap<RequestId, ForceRequest>,
	// force_response and expiry callbacks both mutate a given lock; this
	// mutex per manager (not per lock) is coarse but every critical section
	// under it is a handful of map operations, never an await on I/O.
	serialize: Mutex<()>,
	lock_ttl: Duration,
	warning_before: Duration,
}

/// Shared handle to the lock table, cloneable across the connection
/// dispatcher and the spawned timer tasks.
#[derive(Clone)]
pub struct LockManager {
	inner: Arc<Inner>,
	connections: ConnectionRegistry,
	rooms: RoomRegistry,
	bus: Arc<gateway_bus::RoomBus>,
}

pub struct AcquireOutcome {
	pub locked_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

/// One held lock, as surfaced to the admin `/admin-socket/rooms` snapshot (spec.md §6).
pub struct LockSnapshotEntry {
	pub room_id: RoomId,
	pub sub_resource_id: SubResourceId,
	pub holder: LockHolderView,
}

impl LockManager {
	/// Build a manager using the spec's compile-time defaults (`LOCK_TTL`,
	/// `WARNING_BEFORE`). Deploys that need to override them should use
	/// [`LockManager::with_durations`] instead.
	#[must_use]
	pub fn new(connections: ConnectionRegistry, rooms: RoomRegistry, bus: Arc<gateway_bus::RoomBus>) -> Self {
		Self::with_durations(connections, rooms, bus, LOCK_TTL, WARNING_BEFORE)
	}

	/// Build a manager with deploy-configured hold and warning durations
	/// (spec.md §6 `activityTracking.{lockTTL, warningTime}`).
	#[must_use]
	pub fn with_durations(connections: ConnectionRegistry, rooms: RoomRegistry, bus: Arc<gateway_bus::RoomBus>, lock_ttl: Duration, warning_before: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				locks: DashMap::new(),
				pending_by_lock: DashMap::new(),
				pending_requests: DashMap::new(),
				serialize: Mutex::new(()),
				lock_ttl,
				warning_before,
			}),
			connections,
			rooms,
			bus,
		}
	}

	#[must_use]
	pub fn lock_holder(&self, lock_key: &LockKey) -> Option<LockHolderView> {
		self.inner.locks.get(lock_key).map(|e| e.lock.holder_view())
	}

	/// This manager's configured hold duration (spec.md §6 `activityTracking.lockTTL`).
	#[must_use]
	pub fn lock_ttl(&self) -> Duration {
		self.inner.lock_ttl
	}

	/// This manager's configured pre-expiry warning lead time
	/// (spec.md §6 `activityTracking.warningTime`), used by [`crate::sweeper`]
	/// to classify inactivity the same way the per-lock timer does.
	#[must_use]
	pub fn warning_before(&self) -> Duration {
		self.inner.warning_before
	}

	/// Attempt to acquire `lockKey` for `connection_id`, which must already
	/// be a member of the room `resourceType:resourceUuid`.
	pub async fn acquire(
		&self,
		resource_type: &ResourceType,
		resource_uuid: &ResourceUuid,
		sub_resource_id: &SubResourceId,
		connection_id: &ConnectionId,
		user_id: &UserId,
		username: &Username,
	) -> Result<AcquireOutcome> {
		if sub_resource_id.as_str().is_empty() {
			return Err(GatewayError::InvalidSubResourceId);
		}
		let room_id = RoomId::new(resource_type.as_str(), resource_uuid.as_str());
		if !self.rooms.is_member(&room_id, connection_id) {
			return Err(GatewayError::UserNotInRoom);
		}
		let lock_key = LockKey::new(&room_id, sub_resource_id);

		let _guard = self.inner.serialize.lock().await;
		if let Some(entry) = self.inner.locks.get(&lock_key) {
			return Err(GatewayError::SubResourceAlreadyLocked).inspect_err(|_| {
				debug!(%lock_key, holder = %entry.lock.holder_user_id, "lock contention");
			});
		}

		let now = Utc::now();
		let expires_at = now + chrono::Duration::from_std(self.inner.lock_ttl).unwrap_or_default();
		let lock = Lock {
			holder_connection_id: connection_id.clone(),
			holder_user_id: user_id.clone(),
			holder_username: username.clone(),
			locked_at: now,
			expires_at,
		};
		let timer_token = self.schedule_timers(lock_key.clone(), room_id.clone());
		self.inner.locks.insert(lock_key.clone(), LockEntry { lock, room_id: room_id.clone(), timer_token });

		if let Some(holder) = self.connections.get(connection_id) {
			holder.send(ServerEvent::LockAcquired(LockAcquiredPayload {
				lock_key: lock_key.clone(),
				sub_resource_id: sub_resource_id.clone(),
				locked_at: now,
				expires_at,
			}));
		}
		let _ = self
			.bus
			.broadcast_to_room(
				&room_id,
				ServerEvent::LockBroadcast(LockBroadcastPayload {
					room_id,
					sub_resource_id: sub_resource_id.clone(),
					held_by: LockHolderView {
						user_id: user_id.clone(),
						username: username.clone(),
						locked_at: now,
						expires_at,
					},
				}),
			)
			.await;

		Ok(AcquireOutcome { locked_at: now, expires_at })
	}

	pub async fn release(&self, resource_type: &ResourceType, resource_uuid: &ResourceUuid, sub_resource_id: &SubResourceId, connection_id: &ConnectionId) -> Result<()> {
		let room_id = RoomId::new(resource_type.as_str(), resource_uuid.as_str());
		let lock_key = LockKey::new(&room_id, sub_resource_id);

		let _guard = self.inner.serialize.lock().await;
		let entry = self.inner.locks.get(&lock_key).ok_or(GatewayError::LockNotFound)?;
		if entry.lock.holder_connection_id != *connection_id {
			return Err(GatewayError::LockNotOwned);
		}
		drop(entry);
		let Some(removed) = self.remove_lock_entry(&lock_key) else {
			return Err(GatewayError::LockNotFound);
		};
		self.reject_pending_force_request(&lock_key, "LOCK_RELEASED").await;

		if let Some(holder) = self.connections.get(&removed.holder_connection_id) {
			holder.send(ServerEvent::LockReleased(LockReleasedPayload {
				sub_resource_id: removed.sub_resource_id.clone(),
				reason: "manual",
			}));
		}
		let _ = self
			.bus
			.broadcast_to_room(
				&removed.room_id,
				ServerEvent::UnlockBroadcast(UnlockBroadcastPayload {
					room_id: removed.room_id.clone(),
					sub_resource_id: removed.sub_resource_id,
					reason: "manual",
				}),
			)
			.await;
		Ok(())
	}

	pub async fn extend(&self, resource_type: &ResourceType, resource_uuid: &ResourceUuid, sub_resource_id: &SubResourceId, connection_id: &ConnectionId) -> Result<DateTime<Utc>> {
		let room_id = RoomId::new(resource_type.as_str(), resource_uuid.as_str());
		let lock_key = LockKey::new(&room_id, sub_resource_id);

		let _guard = self.inner.serialize.lock().await;
		let mut entry = self.inner.locks.get_mut(&lock_key).ok_or(GatewayError::LockNotFound)?;
		if entry.lock.holder_connection_id != *connection_id {
			return Err(GatewayError::LockNotOwned);
		}
		entry.timer_token.cancel();
		let new_expires_at = Utc::now() + chrono::Duration::from_std(self.inner.lock_ttl).unwrap_or_default();
		entry.lock.expires_at = new_expires_at;
		entry.timer_token = self.schedule_timers(lock_key.clone(), room_id);
		Ok(new_expires_at)
	}

	/// Release every lock held by a closing connection (disconnect cleanup,
	/// spec.md §4.4). Both the room and the former holder never receive a
	/// direct reply here — the holder's connection is already on its way
	/// out — only the room-wide legacy and unified broadcasts fire.
	pub async fn release_all_for_connection(&self, connection_id: &ConnectionId) {
		let keys: Vec<LockKey> = self
			.inner
			.locks
			.iter()
			.filter(|entry| entry.value().lock.holder_connection_id == *connection_id)
			.map(|entry| entry.key().clone())
			.collect();
		for key in keys {
			let _guard = self.inner.serialize.lock().await;
			let Some(removed) = self.remove_lock_entry(&key) else { continue };
			drop(_guard);
			self.reject_pending_force_request(&key, "OWNER_DISCONNECTED").await;
			self.broadcast_release(&removed, "disconnect", "DISCONNECT").await;
		}
		// any force-transfer request this connection itself initiated is moot
		// now; the requester is gone so there is nobody left to notify.
		let request_ids: Vec<RequestId> = self
			.inner
			.pending_requests
			.iter()
			.filter(|r| r.value().requester_connection_id == *connection_id)
			.map(|r| r.key().clone())
			.collect();
		for request_id in request_ids {
			self.cancel_force_request(&request_id, "REQUESTER_DISCONNECTED").await;
		}
	}

	/// Release a lock due to sweeper-detected inactivity (spec.md §4.6). The
	/// (still-connected, just non-heartbeating) former holder gets a direct
	/// `lock:expired`; the room gets the unified `lock:released` broadcast.
	pub async fn release_for_inactivity(&self, connection_id: &ConnectionId) -> Vec<(RoomId, SubResourceId)> {
		let keys: Vec<LockKey> = self
			.inner
			.locks
			.iter()
			.filter(|entry| entry.value().lock.holder_connection_id == *connection_id)
			.map(|entry| entry.key().clone())
			.collect();
		let mut released = Vec::new();
		for key in keys {
			let _guard = self.inner.serialize.lock().await;
			let Some(removed) = self.remove_lock_entry(&key) else { continue };
			drop(_guard);
			self.reject_pending_force_request(&key, "LOCK_RELEASED").await;
			if let Some(holder) = self.connections.get(&removed.holder_connection_id) {
				holder.send(ServerEvent::LockExpired(LockExpiredPayload {
					sub_resource_id: removed.sub_resource_id.clone(),
					reason: "INACTIVITY_TIMEOUT",
				}));
			}
			released.push((removed.room_id.clone(), removed.sub_resource_id.clone()));
			self.broadcast_release(&removed, "INACTIVITY_TIMEOUT", "INACTIVITY_TIMEOUT").await;
		}
		released
	}

	/// Remove a lock's table entry and cancel its timer. Carries no
	/// notification side effects; callers decide what to emit for their path.
	fn remove_lock_entry(&self, lock_key: &LockKey) -> Option<RemovedLock> {
		let (_, entry) = self.inner.locks.remove(lock_key)?;
		entry.timer_token.cancel();
		let sub_resource_id = SubResourceId::new(lock_key.as_str().rsplit(':').next().unwrap_or_default().to_owned());
		Some(RemovedLock {
			room_id: entry.room_id,
			sub_resource_id,
			holder_connection_id: entry.lock.holder_connection_id,
			holder_user_id: entry.lock.holder_user_id,
			holder_username: entry.lock.holder_username,
		})
	}

	/// A force-transfer request against `lock_key`, if still pending, is moot
	/// now that the lock is gone by some other path; auto-reject it.
	async fn reject_pending_force_request(&self, lock_key: &LockKey, reason: &'static str) {
		let Some((_, pending_request_id)) = self.inner.pending_by_lock.remove(lock_key) else {
			return;
		};
		let Some((_, request)) = self.inner.pending_requests.remove(&pending_request_id) else {
			return;
		};
		request.timeout_token.cancel();
		if let Some(requester) = self.connections.get(&request.requester_connection_id) {
			requester.send(ServerEvent::ForceRequestTimedOut(ForceRequestTimedOutPayload {
				request_id: request.request_id.to_string(),
				sub_resource_id: request.sub_resource_id.clone(),
				reason,
			}));
		}
	}

	/// Broadcast the legacy `subresource:unlocked{reason}` plus the unified
	/// `lock:released{reason}` to a lock's room — the disconnect and
	/// inactivity-sweep paths, which never reply directly to the (gone or
	/// merely inactive) former holder's own release request.
	async fn broadcast_release(&self, removed: &RemovedLock, legacy_reason: &'static str, unified_reason: &'static str) {
		let _ = self
			.bus
			.broadcast_to_room(
				&removed.room_id,
				ServerEvent::UnlockBroadcast(UnlockBroadcastPayload {
					room_id: removed.room_id.clone(),
					sub_resource_id: removed.sub_resource_id.clone(),
					reason: legacy_reason,
				}),
			)
			.await;
		let _ = self
			.bus
			.broadcast_to_room(
				&removed.room_id,
				ServerEvent::LockReleasedBroadcast(LockReleasedBroadcastPayload {
					room_id: removed.room_id.clone(),
					sub_resource_id: removed.sub_resource_id.clone(),
					user_id: removed.holder_user_id.clone(),
					username: removed.holder_username.clone(),
					reason: unified_reason,
				}),
			)
			.await;
		debug!(reason = unified_reason, room_id = %removed.room_id, "released lock");
	}

	fn schedule_timers(&self, lock_key: LockKey, room_id: RoomId) -> CancellationToken {
		let token = CancellationToken::new();
		let child = token.clone();
		let manager = self.clone();
		tokio::spawn(async move {
			let warning_delay = manager.inner.lock_ttl.saturating_sub(manager.inner.warning_before);
			tokio::select! {
				() = child.cancelled() => return,
				() = tokio::time::sleep(warning_delay) => {}
			}
			manager.fire_warning(&lock_key, &room_id).await;

			tokio::select! {
				() = child.cancelled() => return,
				() = tokio::time::sleep(manager.inner.warning_before) => {}
			}
			manager.fire_expiry(&lock_key).await;
		});
		token
	}

	async fn fire_warning(&self, lock_key: &LockKey, _room_id: &RoomId) {
		let Some(entry) = self.inner.locks.get(lock_key) else { return };
		let Some(handle) = self.connections.get(&entry.lock.holder_connection_id) else { return };
		handle.send(ServerEvent::LockExpiringSoon(LockExpiringSoonPayload {
			sub_resource_id: lock_key.as_str().rsplit(':').next().unwrap_or_default().into(),
			expires_at: entry.lock.expires_at,
			seconds_remaining: self.inner.warning_before.as_secs(),
		}));
	}

	async fn fire_expiry(&self, lock_key: &LockKey) {
		let _guard = self.inner.serialize.lock().await;
		let Some(removed) = self.remove_lock_entry(lock_key) else { return };
		drop(_guard);
		self.reject_pending_force_request(lock_key, "LOCK_RELEASED").await;
		if let Some(holder) = self.connections.get(&removed.holder_connection_id) {
			holder.send(ServerEvent::LockExpired(LockExpiredPayload {
				sub_resource_id: removed.sub_resource_id.clone(),
				reason: "timeout",
			}));
		}
		let _ = self
			.bus
			.broadcast_to_room(
				&removed.room_id,
				ServerEvent::UnlockBroadcast(UnlockBroadcastPayload {
					room_id: removed.room_id.clone(),
					sub_resource_id: removed.sub_resource_id,
					reason: "timeout",
				}),
			)
			.await;
	}

	// --- Forced transfer -------------------------------------------------

	#[allow(clippy::too_many_arguments)]
	pub async fn force_request(
		&self,
		resource_type: &ResourceType,
		resource_uuid: &ResourceUuid,
		sub_resource_id: &SubResourceId,
		requester_connection_id: &ConnectionId,
		requester_user_id: &UserId,
		requester_username: &Username,
		message: Option<String>,
	) -> Result<()> {
		let room_id = RoomId::new(resource_type.as_str(), resource_uuid.as_str());
		let lock_key = LockKey::new(&room_id, sub_resource_id);

		let _guard = self.inner.serialize.lock().await;
		let entry = self.inner.locks.get(&lock_key).ok_or(GatewayError::LockNotFound)?;
		if entry.lock.holder_connection_id == *requester_connection_id {
			return Err(GatewayError::CannotForceOwnLock);
		}
		if self.inner.pending_by_lock.contains_key(&lock_key) {
			return Err(GatewayError::ForceRequestAlreadyPending);
		}

		let request_id = RequestId::new();
		let expires_at = Utc::now() + chrono::Duration::from_std(FORCE_REQUEST_TIMEOUT).unwrap_or_default();
		let timeout_token = CancellationToken::new();
		let request = ForceRequest {
			request_id: request_id.clone(),
			lock_key: lock_key.clone(),
			room_id: room_id.clone(),
			sub_resource_id: sub_resource_id.clone(),
			requester_connection_id: requester_connection_id.clone(),
			requester_user_id: requester_user_id.clone(),
			requester_username: requester_username.clone(),
			message: message.clone(),
			timeout_token: timeout_token.clone(),
		};

		if let Some(owner) = self.connections.get(&entry.lock.holder_connection_id) {
			owner.send(ServerEvent::ForceRequestReceived(ForceRequestReceivedPayload {
				request_id: request_id.to_string(),
				sub_resource_id: sub_resource_id.clone(),
				requested_by: gateway_events::views::PublicUser {
					user_id: requester_user_id.clone(),
					username: requester_username.clone(),
					first_name: String::new(),
					last_name: String::new(),
					email: String::new(),
					roles: Vec::new(),
				},
				message: message.clone(),
				expires_at,
			}));
		}
		if let Some(requester) = self.connections.get(requester_connection_id) {
			requester.send(ServerEvent::ForceRequestPending(ForceRequestPendingPayload {
				request_id: request_id.to_string(),
				sub_resource_id: sub_resource_id.clone(),
				expires_at,
			}));
		}

		self.inner.pending_by_lock.insert(lock_key, request_id.clone());
		self.inner.pending_requests.insert(request_id.clone(), request);
		drop(entry);

		let manager = self.clone();
		tokio::spawn(async move {
			tokio::select! {
				() = timeout_token.cancelled() => {}
				() = tokio::time::sleep(FORCE_REQUEST_TIMEOUT) => {
					manager.cancel_force_request(&request_id, "TIMEOUT").await;
				}
			}
		});

		Ok(())
	}

	pub async fn force_response(&self, request_id_raw: &str, approved: bool, message: Option<String>, responder_connection_id: &ConnectionId) -> Result<()> {
		let request_id = find_request_id(&self.inner.pending_requests, request_id_raw).ok_or(GatewayError::ForceRequestNotFound)?;

		let _guard = self.inner.serialize.lock().await;

		// Verify the responder actually holds the lock before touching the
		// pending entry at all — removing it on a rejected ownership check
		// would destroy a still-pending request over a response that was
		// never entitled to answer it (only the holder may; spec.md §4.4).
		let lock_key = {
			let Some(request) = self.inner.pending_requests.get(&request_id) else {
				return Err(GatewayError::ForceRequestAlreadyProcessed);
			};
			request.lock_key.clone()
		};
		let Some(entry) = self.inner.locks.get(&lock_key) else {
			return Err(GatewayError::LockNotFound);
		};
		if entry.lock.holder_connection_id != *responder_connection_id {
			return Err(GatewayError::NotLockOwner);
		}
		drop(entry);

		let Some((_, request)) = self.inner.pending_requests.remove(&request_id) else {
			return Err(GatewayError::ForceRequestAlreadyProcessed);
		};
		self.inner.pending_by_lock.remove(&request.lock_key);
		request.timeout_token.cancel();

		if !approved {
			if let Some(requester) = self.connections.get(&request.requester_connection_id) {
				requester.send(ServerEvent::ForceRequestRejected(ForceRequestRejectedPayload {
					request_id: request.request_id.to_string(),
					sub_resource_id: request.sub_resource_id.clone(),
					reason: "OWNER_REJECTED",
					message,
				}));
			}
			return Ok(());
		}

		// Reuses "timeout" for the approved-transfer release rather than a
		// distinct reason such as "forced" — see DESIGN.md's note on this path.
		self.remove_lock_entry(&request.lock_key);
		let _ = self
			.bus
			.broadcast_to_room(
				&request.room_id,
				ServerEvent::UnlockBroadcast(UnlockBroadcastPayload {
					room_id: request.room_id.clone(),
					sub_resource_id: request.sub_resource_id.clone(),
					reason: "timeout",
				}),
			)
			.await;
		let now = Utc::now();
		let expires_at = now + chrono::Duration::from_std(self.inner.lock_ttl).unwrap_or_default();
		let lock = Lock {
			holder_connection_id: request.requester_connection_id.clone(),
			holder_user_id: request.requester_user_id.clone(),
			holder_username: request.requester_username.clone(),
			locked_at: now,
			expires_at,
		};
		let timer_token = self.schedule_timers(request.lock_key.clone(), request.room_id.clone());
		self.inner.locks.insert(request.lock_key.clone(), LockEntry { lock, room_id: request.room_id.clone(), timer_token });

		if let Some(requester) = self.connections.get(&request.requester_connection_id) {
			requester.send(ServerEvent::ForceRequestApproved(ForceRequestApprovedPayload {
				request_id: request.request_id.to_string(),
				sub_resource_id: request.sub_resource_id.clone(),
				lock_key: request.lock_key.clone(),
				expires_at,
			}));
			requester.send(ServerEvent::LockAcquired(LockAcquiredPayload {
				lock_key: request.lock_key.clone(),
				sub_resource_id: request.sub_resource_id.clone(),
				locked_at: now,
				expires_at,
			}));
		}
		let _ = self
			.bus
			.broadcast_to_room(
				&request.room_id,
				ServerEvent::LockBroadcast(LockBroadcastPayload {
					room_id: request.room_id.clone(),
					sub_resource_id: request.sub_resource_id.clone(),
					held_by: LockHolderView {
						user_id: request.requester_user_id.clone(),
						username: request.requester_username.clone(),
						locked_at: now,
						expires_at,
					},
				}),
			)
			.await;

		Ok(())
	}

	async fn cancel_force_request(&self, request_id: &RequestId, reason: &'static str) {
		let _guard = self.inner.serialize.lock().await;
		let Some((_, request)) = self.inner.pending_requests.remove(request_id) else {
			return;
		};
		self.inner.pending_by_lock.remove(&request.lock_key);
		if let Some(requester) = self.connections.get(&request.requester_connection_id) {
			requester.send(ServerEvent::ForceRequestTimedOut(ForceRequestTimedOutPayload {
				request_id: request.request_id.to_string(),
				sub_resource_id: request.sub_resource_id.clone(),
				reason,
			}));
		}
		warn!(request_id = %request.request_id, reason, "force-transfer request cancelled");
	}

	pub fn deny(&self, holder: LockHolderView, sub_resource_id: SubResourceId) -> ServerEvent {
		ServerEvent::LockDenied(LockDeniedPayload {
			sub_resource_id,
			reason: "SUBRESOURCE_ALREADY_LOCKED",
			held_by: holder,
		})
	}

	#[must_use]
	pub fn lock_count(&self) -> usize {
		self.inner.locks.len()
	}

	/// Snapshot every currently held lock. Used by the admin read-only HTTP
	/// surface and the `active_locks` metrics gauge.
	#[must_use]
	pub fn snapshot(&self) -> Vec<LockSnapshotEntry> {
		self
			.inner
			.locks
			.iter()
			.map(|entry| {
				let sub_resource_id = SubResourceId::new(entry.key().as_str().rsplit(':').next().unwrap_or_default().to_owned());
				LockSnapshotEntry {
					room_id: entry.value().room_id.clone(),
					sub_resource_id,
					holder: entry.value().lock.holder_view(),
				}
			})
			.collect()
	}
}

fn find_request_id(pending: &DashMap<RequestId, ForceRequest>, raw: &str) -> Option<RequestId> {
	pending.iter().find(|entry| entry.key().to_string() == raw).map(|entry| entry.key().clone())
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::sync::Arc;

	use tokio::sync::mpsc;

	use super::*;
	use crate::connection::{AuthenticatedUser, ConnectionHandle};
	use crate::room::RoomLimits;

	fn test_user(id: &str) -> (UserId, Username) {
		(UserId::new(id.to_owned()), Username::new(format!("{id}-name")))
	}

	fn join_connection(connections: &ConnectionRegistry, rooms: &RoomRegistry, room_id: &RoomId, user_id: &str) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
		let (user_id, username) = test_user(user_id);
		let connection_id = ConnectionId::new();
		let (tx, rx) = mpsc::channel(16);
		connections.insert(ConnectionHandle {
			connection_id: connection_id.clone(),
			user: AuthenticatedUser {
				user_id: user_id.clone(),
				username: username.clone(),
				first_name: String::new(),
				last_name: String::new(),
				email: String::new(),
				roles: vec![],
			},
			connected_at: Utc::now(),
			outbox: tx,
			cancel_token: CancellationToken::new(),
		});
		rooms
			.join(
				room_id,
				crate::room::RoomMember {
					connection_id: connection_id.clone(),
					user_id,
					username,
					joined_at: Utc::now(),
					current_sub_resource: None,
					last_activity: Utc::now(),
				},
			)
			.expect("room has capacity");
		(connection_id, rx)
	}

	fn test_manager() -> (LockManager, ConnectionRegistry, RoomRegistry, RoomId) {
		let connections = ConnectionRegistry::new();
		let rooms = RoomRegistry::new(RoomLimits { default: 16, per_resource_type: HashMap::new() });
		let bus = Arc::new(gateway_bus::RoomBus::new());
		let manager = LockManager::new(connections.clone(), rooms.clone(), bus);
		let room_id = RoomId::new("surgery-management", "550e8400-e29b-41d4-a716-446655440000");
		(manager, connections, rooms, room_id)
	}

	#[tokio::test]
	async fn acquire_then_release_notifies_holder_and_room() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (conn, mut rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let sub = SubResourceId::new("vitals".to_owned());
		let _ = manager.bus.join_room(&room_id).await;

		let (user_id, username) = test_user("alice");
		manager.acquire(&resource_type, &resource_uuid, &sub, &conn, &user_id, &username).await.expect("lock acquires");

		manager.release(&resource_type, &resource_uuid, &sub, &conn).await.expect("release succeeds");

		let event = rx.try_recv().expect("lock acquired event queued");
		assert!(matches!(event, ServerEvent::LockAcquired(_)));
		let event = rx.try_recv().expect("lock released event queued");
		assert!(matches!(event, ServerEvent::LockReleased(_)));
	}

	#[tokio::test]
	async fn release_by_non_holder_is_rejected() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (holder, _rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let (other, _rx2) = join_connection(&connections, &rooms, &room_id, "bob");
		let sub = SubResourceId::new("vitals".to_owned());

		let (user_id, username) = test_user("alice");
		manager.acquire(&resource_type, &resource_uuid, &sub, &holder, &user_id, &username).await.expect("lock acquires");

		let result = manager.release(&resource_type, &resource_uuid, &sub, &other).await;
		assert!(matches!(result, Err(GatewayError::LockNotOwned)));
	}

	#[tokio::test]
	async fn second_acquire_on_same_subresource_is_denied() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (first, _rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let (second, _rx2) = join_connection(&connections, &rooms, &room_id, "bob");
		let sub = SubResourceId::new("vitals".to_owned());

		let (alice_id, alice_name) = test_user("alice");
		manager.acquire(&resource_type, &resource_uuid, &sub, &first, &alice_id, &alice_name).await.expect("lock acquires");

		let (bob_id, bob_name) = test_user("bob");
		let result = manager.acquire(&resource_type, &resource_uuid, &sub, &second, &bob_id, &bob_name).await;
		assert!(matches!(result, Err(GatewayError::SubResourceAlreadyLocked)));
	}

	#[tokio::test]
	async fn disconnect_releases_locks_without_direct_reply_to_holder() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (holder, mut rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let sub = SubResourceId::new("vitals".to_owned());
		let mut room_rx = manager.bus.join_room(&room_id).await;

		let (user_id, username) = test_user("alice");
		manager.acquire(&resource_type, &resource_uuid, &sub, &holder, &user_id, &username).await.expect("lock acquires");
		let _ = rx.try_recv();

		manager.release_all_for_connection(&holder).await;

		assert!(rx.try_recv().is_err(), "a disconnecting connection is never sent its own release events");
		let broadcast = room_rx.recv().await.expect("legacy unlock broadcast");
		assert!(matches!(broadcast, ServerEvent::UnlockBroadcast(_)));
		let broadcast = room_rx.recv().await.expect("unified lock:released broadcast");
		assert!(matches!(broadcast, ServerEvent::LockReleasedBroadcast(_)));
	}

	#[tokio::test]
	async fn extend_refreshes_expiry_and_keeps_ownership() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (holder, _rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let sub = SubResourceId::new("vitals".to_owned());

		let (user_id, username) = test_user("alice");
		let acquired = manager.acquire(&resource_type, &resource_uuid, &sub, &holder, &user_id, &username).await.expect("lock acquires");
		let extended_at = manager.extend(&resource_type, &resource_uuid, &sub, &holder).await.expect("extend succeeds");
		assert!(extended_at >= acquired.expires_at);
	}

	#[tokio::test]
	async fn force_response_from_non_holder_leaves_request_pending() {
		let (manager, connections, rooms, room_id) = test_manager();
		let (resource_type, resource_uuid) = (ResourceType::new("surgery-management"), ResourceUuid::new("550e8400-e29b-41d4-a716-446655440000"));
		let (holder, _holder_rx) = join_connection(&connections, &rooms, &room_id, "alice");
		let (requester, _requester_rx) = join_connection(&connections, &rooms, &room_id, "bob");
		let sub = SubResourceId::new("vitals".to_owned());

		let (alice_id, alice_name) = test_user("alice");
		manager.acquire(&resource_type, &resource_uuid, &sub, &holder, &alice_id, &alice_name).await.expect("lock acquires");

		let (bob_id, bob_name) = test_user("bob");
		manager
			.force_request(&resource_type, &resource_uuid, &sub, &requester, &bob_id, &bob_name, None)
			.await
			.expect("force request succeeds");

		let request_id = manager.inner.pending_requests.iter().next().expect("request is pending").key().to_string();

		// The requester is not the holder and must not be able to answer their
		// own force request, nor destroy it by trying.
		let result = manager.force_response(&request_id, true, None, &requester).await;
		assert!(matches!(result, Err(GatewayError::NotLockOwner)));
		assert_eq!(manager.inner.pending_requests.len(), 1, "rejected responder must not remove the still-pending request");

		manager.force_response(&request_id, true, None, &holder).await.expect("holder can still respond");
		assert!(manager.inner.pending_requests.is_empty());
	}
}
