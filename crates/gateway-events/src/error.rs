use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ids::{ConnectionId, UserId};

/// Wire-level error category. Every `socket:error` payload carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
	Validation,
	Authorization,
	NotFound,
	Conflict,
	RateLimit,
	Timeout,
	Internal,
}

/// The uniform error envelope emitted to the originator of a failed operation.
///
/// Mirrors the teacher's `FileHostError` → `IntoResponse` shape, but targets a
/// WebSocket frame instead of an HTTP response: there is no status code, only
/// a category, a stable machine-readable code, and optional details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketError {
	pub category: ErrorCategory,
	pub error_code: &'static str,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	pub timestamp: DateTime<Utc>,
	pub socket_id: ConnectionId,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub user_id: Option<UserId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub event_name: Option<&'static str>,
}

/// Implemented by crates that own a domain error taxonomy (`gateway-core`'s
/// `GatewayError`) so the dispatcher can turn any of them into the one wire
/// shape without the event crate needing to know about domain internals.
pub trait IntoSocketError {
	fn category(&self) -> ErrorCategory;
	fn error_code(&self) -> &'static str;
	/// Structured extra context. Omitted from the wire payload in release
	/// builds for `Internal`-category errors, per spec.md §7.
	fn details(&self) -> Option<serde_json::Value> {
		None
	}

	fn into_socket_error(self, socket_id: ConnectionId, user_id: Option<UserId>, event_name: Option<&'static str>) -> SocketError
	where
		Self: std::fmt::Display + Sized,
	{
		let category = self.category();
		let error_code = self.error_code();
		let details = if matches!(category, ErrorCategory::Internal) && !cfg!(debug_assertions) {
			None
		} else {
			self.details()
		};
		let message = self.to_string();

		SocketError {
			category,
			error_code,
			message,
			details,
			timestamp: Utc::now(),
			socket_id,
			user_id,
			event_name,
		}
	}
}
