//! Hallmark Identify -- the identify / identify-push protocol engine.
//!
//! Immediately after a connection is established each side requests the
//! other's identity record (public key, listen addresses, supported
//! protocols, agent string, optionally a signed peer record). Push
//! proactively broadcasts local identity changes to every connected peer
//! that speaks the push protocol.

pub mod config;
pub mod connection;
pub mod engine;
pub mod events;
mod reconcile;

pub use config::IdentifyConfig;
pub use connection::{
    ByteStream, Connection, ConnectionManager, ProtocolHandler, Registrar, StreamLimits, Substream,
};
pub use engine::{Identify, IdentifyOptions};
pub use events::HostEvent;

pub use hallmark_protocol::{ProtocolError, IDENTIFY_PROTOCOL, PUSH_PROTOCOL};
