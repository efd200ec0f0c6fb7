//! Prometheus metrics, grounded on the teacher's `metrics/observability.rs`
//! registry-plus-handler pattern, trimmed to the gauges/counters this system
//! actually needs instead of the teacher's HTTP-route-latency histograms and
//! OpenTelemetry export pipeline (out of scope per spec.md's Non-goals on
//! observability infrastructure beyond these counters).

use prometheus::{IntCounter, IntGauge, Registry};

pub struct GatewayMetrics {
	registry: Registry,
	pub active_connections: IntGauge,
	pub active_rooms: IntGauge,
	pub active_locks: IntGauge,
	pub rate_limit_violations: IntCounter,
	pub connections_banned: IntCounter,
	pub force_transfers_approved: IntCounter,
	pub force_transfers_rejected: IntCounter,
	pub force_transfers_timed_out: IntCounter,
}

impl GatewayMetrics {
	#[must_use]
	#[allow(clippy::missing_panics_doc)]
	pub fn new() -> Self {
		let registry = Registry::new();
		let active_connections = IntGauge::new("gateway_active_connections", "Currently open WebSocket connections").unwrap();
		let active_rooms = IntGauge::new("gateway_active_rooms", "Rooms with at least one member").unwrap();
		let active_locks = IntGauge::new("gateway_active_locks", "Currently held sub-resource locks").unwrap();
		let rate_limit_violations = IntCounter::new("gateway_rate_limit_violations_total", "Rate limit violations observed").unwrap();
		let connections_banned = IntCounter::new("gateway_connections_banned_total", "Connections banned for repeated rate-limit abuse").unwrap();
		let force_transfers_approved = IntCounter::new("gateway_force_transfers_approved_total", "Force-transfer requests approved by the holder").unwrap();
		let force_transfers_rejected = IntCounter::new("gateway_force_transfers_rejected_total", "Force-transfer requests rejected by the holder").unwrap();
		let force_transfers_timed_out = IntCounter::new("gateway_force_transfers_timed_out_total", "Force-transfer requests that timed out unanswered").unwrap();

		for collector in [
			Box::new(active_connections.clone()) as Box<dyn prometheus::core::Collector>,
			Box::new(active_rooms.clone()),
			Box::new(active_locks.clone()),
			Box::new(rate_limit_violations.clone()),
			Box::new(connections_banned.clone()),
			Box::new(force_transfers_approved.clone()),
			Box::new(force_transfers_rejected.clone()),
			Box::new(force_transfers_timed_out.clone()),
		] {
			registry.register(collector).expect("metric names are unique and registered once");
		}

		Self {
			registry,
			active_connections,
			active_rooms,
			active_locks,
			rate_limit_violations,
			connections_banned,
			force_transfers_approved,
			force_transfers_rejected,
			force_transfers_timed_out,
		}
	}
}

impl Default for GatewayMetrics {
	fn default() -> Self {
		Self::new()
	}
}

impl GatewayMetrics {
	#[must_use]
	pub fn gather(&self) -> Vec<prometheus::proto::MetricFamily> {
		self.registry.gather()
	}
}
