//! # tether-core
//!
//! Shared vocabulary for the tether connection client.
//!
//! This crate holds the portable, mostly-sync building blocks the client
//! driver composes:
//!
//! - **Envelope**: the wire-level message wrapper (`type`, `payload`,
//!   `timestamp`, optional `id`)
//! - **Branded IDs**: `RequestId` newtype for correlated requests
//! - **State machine**: `ConnectionState` and its legal transitions
//! - **Stats**: `ConnectionStats` counters snapshot
//! - **Backoff**: exponential reconnection delay policy
//! - **Errors**: `ClientError` / `TransportError` hierarchy via `thiserror`
//! - **Settings**: `TetherSettings` with file deep-merge and env overrides

#![deny(unsafe_code)]

pub mod backoff;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod settings;
pub mod state;
pub mod stats;

pub use backoff::{Backoff, delay_for_attempt};
pub use envelope::Envelope;
pub use errors::{ClientError, Result, TransportError};
pub use ids::RequestId;
pub use settings::TetherSettings;
pub use state::ConnectionState;
pub use stats::ConnectionStats;
