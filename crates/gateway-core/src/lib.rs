pub mod connection;
pub mod errors;
pub mod lock;
pub mod resource;
pub mod room;
pub mod sweeper;
pub mod validator;

pub use connection::{AuthenticatedUser, ConnectionHandle, ConnectionRegistry, Outbox};
pub use errors::{GatewayError, Result};
pub use lock::{LockManager, LockSnapshotEntry, FORCE_REQUEST_TIMEOUT, LOCK_TTL, WARNING_BEFORE};
pub use resource::{ResourceJoinOutcome, ResourceJoinService, SupportedResourceTypes};
pub use room::{RoomLimits, RoomMember, RoomRegistry};
pub use sweeper::ActivitySweeper;
pub use validator::{AlwaysOpenResourceValidator, ResourceRecord, ResourceValidator};
