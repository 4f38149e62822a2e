//! # tether-client
//!
//! Persistent duplex connection manager over WebSocket.
//!
//! One logical channel to a server, kept alive across transient failures:
//!
//! - **Automatic reconnection** with exponential backoff and attempt caps
//! - **Request/response correlation** over a single stream, with per-request
//!   timeouts
//! - **Outbound queueing** of fire-and-forget traffic while disconnected,
//!   flushed FIFO on reconnect
//! - **Heartbeat** liveness probes with latency sampling
//! - **Typed event bus** for state changes and inbound broadcasts
//!
//! The entry point is [`TetherClient`]; everything else is a collaborator it
//! composes. The transport is injectable through [`transport::Connector`],
//! which keeps tests deterministic and the core free of host specifics.

#![deny(unsafe_code)]

pub mod bus;
pub mod client;
pub mod correlator;
pub mod heartbeat;
pub mod platform;
pub mod queue;
pub mod transport;

pub use bus::{ClientEvent, EventFilter, Subscription};
pub use client::{ClientBuilder, TetherClient};
pub use platform::{platform_channel, PlatformHandle, PlatformSignal};
pub use tether_core::{
    ClientError, ConnectionState, ConnectionStats, Envelope, RequestId, Result, TetherSettings,
    TransportError,
};
