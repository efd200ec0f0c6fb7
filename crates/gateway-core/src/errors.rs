use gateway_events::{ErrorCategory, IntoSocketError};
use thiserror::Error;

/// Domain error taxonomy for the connection/room/lock subsystems. Every
/// variant carries its own wire-stable error code and category so the
/// dispatcher can turn it into a `socket:error` without a lookup table.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("missing bearer token")]
	MissingToken,
	#[error("token could not be parsed")]
	InvalidToken,
	#[error("token has expired")]
	TokenExpired,

	#[error("user already has {current} of {limit} allowed connections")]
	MaxConnectionsExceeded { limit: usize, current: usize },

	#[error("roomId must not be empty")]
	InvalidRoomId,
	#[error("frame did not match any known event shape")]
	MalformedFrame,
	#[error("room {room_id} is full ({current}/{max})")]
	RoomFull { room_id: String, current: usize, max: usize },
	#[error("connection is not authenticated")]
	Unauthenticated,
	#[error("user is not a member of this room")]
	UserNotInRoom,

	#[error("unsupported resource type {0}")]
	UnsupportedResourceType(String),
	#[error("resourceUuid is not in canonical form")]
	InvalidResourceUuid,
	#[error("resource was not found")]
	ResourceNotFound,
	#[error("resource is not open for collaboration (status: {status})")]
	ResourceClosed { status: String },

	#[error("subResourceId must not be empty")]
	InvalidSubResourceId,
	#[error("sub-resource is already locked")]
	SubResourceAlreadyLocked,
	#[error("no lock exists for this sub-resource")]
	LockNotFound,
	#[error("connection does not hold this lock")]
	LockNotOwned,

	#[error("cannot force-request your own lock")]
	CannotForceOwnLock,
	#[error("a force-transfer request is already pending for this lock")]
	ForceRequestAlreadyPending,
	#[error("connection is not the current lock holder")]
	NotLockOwner,
	#[error("force-transfer request already reached a terminal state")]
	ForceRequestAlreadyProcessed,
	#[error("force-transfer request not found")]
	ForceRequestNotFound,

	#[error("internal error: {0}")]
	Internal(String),
}

impl IntoSocketError for GatewayError {
	fn category(&self) -> ErrorCategory {
		match self {
			Self::MissingToken | Self::InvalidToken | Self::TokenExpired | Self::Unauthenticated => ErrorCategory::Authorization,
			Self::MaxConnectionsExceeded { .. } => ErrorCategory::RateLimit,
			Self::InvalidRoomId
			| Self::MalformedFrame
			| Self::UnsupportedResourceType(_)
			| Self::InvalidResourceUuid
			| Self::InvalidSubResourceId
			| Self::UserNotInRoom
			| Self::CannotForceOwnLock => ErrorCategory::Validation,
			Self::RoomFull { .. } | Self::SubResourceAlreadyLocked | Self::ForceRequestAlreadyPending | Self::ForceRequestAlreadyProcessed => {
				ErrorCategory::Conflict
			}
			Self::ResourceNotFound | Self::LockNotFound | Self::ForceRequestNotFound => ErrorCategory::NotFound,
			Self::ResourceClosed { .. } => ErrorCategory::Conflict,
			Self::LockNotOwned | Self::NotLockOwner => ErrorCategory::Authorization,
			Self::Internal(_) => ErrorCategory::Internal,
		}
	}

	fn error_code(&self) -> &'static str {
		match self {
			Self::MissingToken => "MISSING_TOKEN",
			Self::InvalidToken => "INVALID_TOKEN",
			Self::TokenExpired => "TOKEN_EXPIRED",
			Self::MaxConnectionsExceeded { .. } => "MAX_CONNECTIONS_EXCEEDED",
			Self::InvalidRoomId => "INVALID_ROOM_ID",
			Self::MalformedFrame => "MALFORMED_FRAME",
			Self::RoomFull { .. } => "ROOM_FULL",
			Self::Unauthenticated => "UNAUTHENTICATED",
			Self::UserNotInRoom => "USER_NOT_IN_ROOM",
			Self::UnsupportedResourceType(_) => "UNSUPPORTED_RESOURCE_TYPE",
			Self::InvalidResourceUuid => "INVALID_RESOURCE_UUID",
			Self::ResourceNotFound => "SURGERY_NOT_FOUND",
			Self::ResourceClosed { .. } => "RESOURCE_CLOSED",
			Self::InvalidSubResourceId => "INVALID_SUBRESOURCE_ID",
			Self::SubResourceAlreadyLocked => "SUBRESOURCE_ALREADY_LOCKED",
			Self::LockNotFound => "LOCK_NOT_FOUND",
			Self::LockNotOwned => "LOCK_NOT_OWNED",
			Self::CannotForceOwnLock => "CANNOT_FORCE_OWN_LOCK",
			Self::ForceRequestAlreadyPending => "FORCE_REQUEST_ALREADY_PENDING",
			Self::NotLockOwner => "NOT_LOCK_OWNER",
			Self::ForceRequestAlreadyProcessed => "FORCE_REQUEST_ALREADY_PROCESSED",
			Self::ForceRequestNotFound => "FORCE_REQUEST_NOT_FOUND",
			Self::Internal(_) => "INTERNAL_ERROR",
		}
	}
}

pub type Result<T> = std::result::Result<T, GatewayError>;
