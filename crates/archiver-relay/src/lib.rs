//! archiver-relay: the long-lived background relay and the per-document
//! client session that talks to it.

pub mod client;
pub mod config_store;
pub mod error;
pub mod manager;
pub mod server;
pub mod surface;
pub mod transport;

pub use client::{ClientSession, LinkState, UiEvent};
pub use config_store::ConfigStore;
pub use error::{ConfigError, TransportError};
pub use manager::{Attachment, ConnectionManager, ManagerHandle, ManagerStatus};
pub use server::RelayServer;
pub use surface::Surface;
pub use transport::{RelayConnection, RelayConnector, UnixConnector};
