//! Wire types shared between the gateway's connection dispatcher and every
//! domain crate: identifiers, the inbound/outbound event catalogue, the
//! error envelope, and small view types projected onto the wire.

pub mod bus;
pub mod duration_fmt;
pub mod error;
pub mod ids;
pub mod inbound;
pub mod outbound;
pub mod views;

pub use bus::ResourceUpdatedEvent;
pub use error::{ErrorCategory, IntoSocketError, SocketError};
pub use ids::{ConnectionId, LockKey, RequestId, ResourceType, ResourceUuid, RoomId, SubResourceId, UserId, Username};
pub use inbound::ClientEvent;
pub use outbound::ServerEvent;
