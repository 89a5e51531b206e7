//! Typed client for the Murmur backend command bridge.
//!
//! The desktop shell is purely presentational; every durable entity and every
//! piece of business logic lives in the backend process. This crate is the
//! seam: request/response commands over a local HTTP endpoint and push events
//! over a WebSocket stream, both as JSON.

mod client;
mod error;
mod events;
mod types;

pub use client::{EventStream, RemoteBridge, DEFAULT_BASE_URL};
pub use error::{BridgeError, BridgeResult};
pub use events::{parse_frame, BridgeEvent};
pub use types::*;
