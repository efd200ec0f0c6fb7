//! Transport Layer Crate
//!
//! Provides a clean abstraction for managing per-connection transport tasks
//! with channels for communication between transport and coordinator layers.

mod error;
mod receiver;
mod traits;

pub mod inmem;
pub mod room_bus;

pub use error::TransportError;
pub use receiver::TransportReceiver;
pub use traits::Transport;

pub type InMemTransportReceiver<E> = TransportReceiver<E, inmem::InMemReceiver<E>>;

pub use inmem::InMemTransport;
pub use room_bus::RoomBus;
