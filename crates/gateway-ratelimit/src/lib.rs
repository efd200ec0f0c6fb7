//! Per-connection, per-event-name rate limiting with progressive penalties.
//!
//! Each connection gets its own sliding window per event name, its own
//! violation ledger, and its own ban record. Violations and bans are keyed by
//! `ConnectionId`, not `UserId`: a reconnecting abuser under a fresh
//! connection id starts clean. That is a deliberate, narrow policy choice,
//! not an oversight — see the crate's design notes for the tradeoff.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use gateway_events::ConnectionId;
use tracing::debug;

/// How long a violation counter survives without a fresh violation before it resets.
pub const VIOLATION_EXPIRY: Duration = Duration::from_secs(5 * 60);

/// Ban length applied once violations reach the ban threshold.
pub const BAN_DURATION: Duration = Duration::from_secs(5 * 60);

/// Violation count at which a connection is banned outright.
pub const BAN_THRESHOLD: u32 = 5;

/// Violation counts at which a warning additionally schedules a disconnect.
pub const DISCONNECT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct EventLimit {
	pub limit: usize,
	pub window: Duration,
}

/// Table of per-event-name sliding-window limits, falling back to a default
/// for any event name not listed explicitly.
#[must_use]
pub fn limit_for_event(event_name: &str) -> EventLimit {
	match event_name {
		"room:join" => EventLimit { limit: 2, window: Duration::from_secs(5) },
		"surgery:lock" => EventLimit { limit: 5, window: Duration::from_secs(1) },
		_ => EventLimit { limit: 10, window: Duration::from_secs(1) },
	}
}

/// Outcome of a rate-limit check for a single incoming event.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
	/// Under the window limit; the event may proceed.
	Allowed,
	/// Already banned; the event is dropped without incrementing anything further.
	Blocked { reason: &'static str },
	/// Over the window limit, violation count below the disconnect threshold.
	Warning { limit: EventLimit, violation_count: u32 },
	/// Over the window limit and at the disconnect threshold: warn, then the
	/// caller should schedule a disconnect after a brief delay.
	WarnAndDisconnect { limit: EventLimit, violation_count: u32 },
	/// Over the window limit and at the ban threshold: the connection is now banned.
	Banned { violation_count: u32, duration: Duration },
}

struct Violations {
	count: u32,
	last_at: Instant,
}

struct Ban {
	until: Instant,
	reason: &'static str,
}

#[derive(Default)]
struct ConnectionState {
	windows: HashMap<&'static str, VecDeque<Instant>>,
	violations: Option<Violations>,
	ban: Option<Ban>,
}

impl ConnectionState {
	fn record_violation(&mut self, now: Instant) -> u32 {
		let expired = self.violations.as_ref().is_some_and(|v| now.duration_since(v.last_at) > VIOLATION_EXPIRY);
		if expired || self.violations.is_none() {
			self.violations = Some(Violations { count: 1, last_at: now });
		} else if let Some(v) = self.violations.as_mut() {
			v.count += 1;
			v.last_at = now;
		}
		self.violations.as_ref().map_or(1, |v| v.count)
	}
}

struct Inner {
	connections: DashMap<ConnectionId, ConnectionState>,
}

/// Rate limiter shared across the connection dispatcher.
#[derive(Clone)]
pub struct RateLimiter {
	inner: Arc<Inner>,
}

impl Default for RateLimiter {
	fn default() -> Self {
		Self::new()
	}
}

impl RateLimiter {
	#[must_use]
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner { connections: DashMap::new() }),
		}
	}

	/// Check (and, if allowed, record) an incoming event for `connection_id`.
	///
	/// `event_name` must be a `'static` string: the dispatcher routes on a
	/// fixed event catalogue, so every caller passes a literal or an interned
	/// name, never untrusted client input.
	pub fn check(&self, connection_id: &ConnectionId, event_name: &'static str) -> CheckOutcome {
		let now = Instant::now();
		let mut state = self.inner.connections.entry(connection_id.clone()).or_default();

		if let Some(ban) = &state.ban {
			if now < ban.until {
				return CheckOutcome::Blocked { reason: ban.reason };
			}
			let reason = ban.reason;
			debug!(%connection_id, reason, "ban expired, clearing violations");
			state.ban = None;
			state.violations = None;
		}

		let limit = limit_for_event(event_name);
		let window = state.windows.entry(event_name).or_default();
		while let Some(front) = window.front() {
			if now.duration_since(*front) > limit.window {
				window.pop_front();
			} else {
				break;
			}
		}

		if window.len() >= limit.limit {
			let violation_count = state.record_violation(now);
			return self.penalize(&mut state, now, limit, violation_count);
		}

		window.push_back(now);
		CheckOutcome::Allowed
	}

	fn penalize(&self, state: &mut ConnectionState, now: Instant, limit: EventLimit, violation_count: u32) -> CheckOutcome {
		if violation_count >= BAN_THRESHOLD {
			state.ban = Some(Ban {
				until: now + BAN_DURATION,
				reason: "RATE_LIMIT_ABUSE",
			});
			CheckOutcome::Banned {
				violation_count,
				duration: BAN_DURATION,
			}
		} else if violation_count >= DISCONNECT_THRESHOLD {
			CheckOutcome::WarnAndDisconnect { limit, violation_count }
		} else {
			CheckOutcome::Warning { limit, violation_count }
		}
	}

	/// Drop sliding-window state for a disconnected connection. Violations
	/// and bans are retained deliberately so a reconnecting abuser under the
	/// same connection id (still tracked until the socket actually closes)
	/// stays penalized; callers that assign a fresh `ConnectionId` per
	/// reconnect will naturally start this connection clean.
	pub fn forget_windows(&self, connection_id: &ConnectionId) {
		if let Some(mut state) = self.inner.connections.get_mut(connection_id) {
			state.windows.clear();
		}
	}

	/// Fully drop all state — windows, violations, and bans — for a connection id.
	pub fn evict(&self, connection_id: &ConnectionId) {
		self.inner.connections.remove(connection_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allows_up_to_limit_then_warns() {
		let limiter = RateLimiter::new();
		let conn = ConnectionId::new();
		for _ in 0..10 {
			assert!(matches!(limiter.check(&conn, "chat:message"), CheckOutcome::Allowed));
		}
		match limiter.check(&conn, "chat:message") {
			CheckOutcome::Warning { violation_count, .. } => assert_eq!(violation_count, 1),
			other => panic!("expected warning, got {other:?}"),
		}
	}

	#[test]
	fn escalates_to_disconnect_then_ban() {
		let limiter = RateLimiter::new();
		let conn = ConnectionId::new();
		for _ in 0..10 {
			limiter.check(&conn, "chat:message");
		}
		// violation 1, 2 -> warning; 3, 4 -> warn+disconnect; 5 -> ban
		let outcomes: Vec<_> = (0..5).map(|_| limiter.check(&conn, "chat:message")).collect();
		assert!(matches!(outcomes[0], CheckOutcome::Warning { .. }));
		assert!(matches!(outcomes[1], CheckOutcome::Warning { .. }));
		assert!(matches!(outcomes[2], CheckOutcome::WarnAndDisconnect { .. }));
		assert!(matches!(outcomes[3], CheckOutcome::WarnAndDisconnect { .. }));
		assert!(matches!(outcomes[4], CheckOutcome::Banned { .. }));
	}

	#[test]
	fn banned_connection_is_blocked_until_expiry() {
		let limiter = RateLimiter::new();
		let conn = ConnectionId::new();
		for _ in 0..10 {
			limiter.check(&conn, "chat:message");
		}
		for _ in 0..5 {
			limiter.check(&conn, "chat:message");
		}
		match limiter.check(&conn, "chat:message") {
			CheckOutcome::Blocked { reason } => assert_eq!(reason, "RATE_LIMIT_ABUSE"),
			other => panic!("expected blocked, got {other:?}"),
		}
	}

	#[test]
	fn per_event_name_windows_are_independent() {
		let limiter = RateLimiter::new();
		let conn = ConnectionId::new();
		for _ in 0..2 {
			assert!(matches!(limiter.check(&conn, "room:join"), CheckOutcome::Allowed));
		}
		assert!(matches!(limiter.check(&conn, "room:join"), CheckOutcome::Warning { .. }));
		// a different event name on the same connection still has its own budget.
		assert!(matches!(limiter.check(&conn, "room:leave"), CheckOutcome::Allowed));
	}

	#[test]
	fn forget_windows_clears_throughput_state_but_not_bans() {
		let limiter = RateLimiter::new();
		let conn = ConnectionId::new();
		for _ in 0..10 {
			limiter.check(&conn, "chat:message");
		}
		for _ in 0..5 {
			limiter.check(&conn, "chat:message");
		}
		limiter.forget_windows(&conn);
		assert!(matches!(limiter.check(&conn, "chat:message"), CheckOutcome::Blocked { .. }));
	}
}
