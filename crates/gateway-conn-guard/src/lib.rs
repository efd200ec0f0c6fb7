//! Per-user connection admission.
//!
//! Enforces a single invariant: for every `userId`, the number of concurrently
//! admitted connections never exceeds a configured cap. Admission is
//! reject-on-admit — there is no queueing, no backpressure, no waiting for a
//! slot to free up. A connection either gets in now or is told to retry
//! later with a fixed delay.
//!
//! This is a narrower contract than a general-purpose multi-tenant limiter:
//! no global cap across all users, no per-client queue. The per-user cap is
//! the only axis the collaboration gateway's admission rule cares about.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gateway_events::UserId;
use tracing::debug;

/// Fixed retry delay surfaced to a caller rejected by [`AdmitError::CapExceeded`].
pub const RETRY_AFTER_MS: u64 = 5_000;

/// Fraction of `cap` at which a newly admitted connection also carries a warning.
pub const WARNING_THRESHOLD_PERCENT: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
	#[error("user already has {current} of {limit} allowed connections")]
	CapExceeded { limit: usize, current: usize },
}

/// Outcome of a successful admission: the permit itself, plus whether the
/// caller crossed the warning threshold and should be told so.
pub struct Admission {
	pub permit: ConnectionPermit,
	pub current: usize,
	pub limit: usize,
}

impl Admission {
	#[must_use]
	pub fn percentage_used(&self) -> u8 {
		if self.limit == 0 {
			100
		} else {
			(((self.current * 100) / self.limit).min(100)) as u8
		}
	}

	#[must_use]
	pub fn crosses_warning_threshold(&self) -> bool {
		u32::from(self.percentage_used()) >= u32::from(WARNING_THRESHOLD_PERCENT)
	}
}

/// RAII handle for one admitted connection. Dropping it frees the slot.
pub struct ConnectionPermit {
	user_id: UserId,
	inner: Arc<ConnectionGuardInner>,
}

impl Drop for ConnectionPermit {
	fn drop(&mut self) {
		if let Some(count) = self.inner.counts.get(&self.user_id) {
			let previous = count.fetch_sub(1, Ordering::AcqRel);
			debug!(user_id = %self.user_id, remaining = previous.saturating_sub(1), "connection permit released");
			if previous <= 1 {
				// Best-effort cleanup: another admit racing us into re-creating the
				// entry is harmless, it just starts back at zero.
				self.inner.counts.remove_if(&self.user_id, |_, c| c.load(Ordering::Acquire) == 0);
			}
		}
	}
}

struct ConnectionGuardInner {
	counts: DashMap<UserId, AtomicUsize>,
}

/// Per-user admission gate, cloneable and shared across the connection registry.
#[derive(Clone)]
pub struct ConnectionGuard {
	inner: Arc<ConnectionGuardInner>,
	cap: usize,
}

impl ConnectionGuard {
	#[must_use]
	pub fn new(cap: usize) -> Self {
		Self {
			inner: Arc::new(ConnectionGuardInner { counts: DashMap::new() }),
			cap,
		}
	}

	/// Attempt to admit a new connection for `user_id`. Rejects immediately
	/// if the user is already at cap; never queues or retries internally.
	pub fn try_admit(&self, user_id: UserId) -> Result<Admission, AdmitError> {
		let entry = self.inner.counts.entry(user_id.clone()).or_insert_with(|| AtomicUsize::new(0));

		loop {
			let current = entry.load(Ordering::Acquire);
			if current >= self.cap {
				return Err(AdmitError::CapExceeded { limit: self.cap, current });
			}
			if entry.compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire).is_ok() {
				let admitted = current + 1;
				debug!(user_id = %user_id, current = admitted, limit = self.cap, "connection admitted");
				return Ok(Admission {
					permit: ConnectionPermit {
						user_id,
						inner: self.inner.clone(),
					},
					current: admitted,
					limit: self.cap,
				});
			}
		}
	}

	#[must_use]
	pub fn active_for_user(&self, user_id: &UserId) -> usize {
		self.inner.counts.get(user_id).map_or(0, |c| c.load(Ordering::Acquire))
	}

	#[must_use]
	pub fn cap(&self) -> usize {
		self.cap
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn uid(s: &str) -> UserId {
		UserId::new(s.to_owned())
	}

	#[test]
	fn admits_up_to_cap_then_rejects() {
		let guard = ConnectionGuard::new(5);
		let mut permits = Vec::new();
		for _ in 0..5 {
			permits.push(guard.try_admit(uid("userA")).expect("should admit"));
		}
		let rejection = guard.try_admit(uid("userA")).unwrap_err();
		match rejection {
			AdmitError::CapExceeded { limit, current } => {
				assert_eq!(limit, 5);
				assert_eq!(current, 5);
			}
		}
	}

	#[test]
	fn fifth_of_five_crosses_warning_threshold() {
		let guard = ConnectionGuard::new(5);
		let mut last = None;
		for _ in 0..5 {
			last = Some(guard.try_admit(uid("userA")).expect("should admit"));
		}
		let admission = last.unwrap();
		assert_eq!(admission.current, 5);
        assert_eq!(admission.percentage_used(), 100);
		assert!(admission.crosses_warning_threshold());
	}

	#[test]
	fn releasing_a_permit_frees_a_slot() {
		let guard = ConnectionGuard::new(1);
		let admission = guard.try_admit(uid("userA")).expect("should admit");
		assert!(guard.try_admit(uid("userA")).is_err());
		drop(admission.permit);
		assert!(guard.try_admit(uid("userA")).is_ok());
	}

	#[test]
	fn users_are_independent() {
		let guard = ConnectionGuard::new(1);
		let _a = guard.try_admit(uid("userA")).expect("should admit");
		let _b = guard.try_admit(uid("userB")).expect("should admit");
	}
}
