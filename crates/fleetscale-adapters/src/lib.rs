//! fleetscale-adapters — HTTP implementations of the autoscaler ports.
//!
//! ```text
//! CollectorTelemetry ── GET snapshot ──▶ telemetry collector
//!        │
//!        └── history ──▶ StateStore (redb)
//!
//! HttpFleet ── groups / spawn / reap ──▶ fleet agent
//!     └────── PUT /v1/info/state ──────▶ query-engine worker
//!
//! DryRunFleet<F> ── reads via F, mutations logged only
//! ```
//!
//! Every request is bounded by the `JsonClient` timeout.

pub mod client;
pub mod dry_run;
pub mod error;
pub mod fleet;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use client::JsonClient;
pub use dry_run::DryRunFleet;
pub use error::AdapterError;
pub use fleet::{DEFAULT_PRESTO_PORT, HttpFleet, resolve_host};
pub use telemetry::{CollectorTelemetry, DEFAULT_HISTORY_RETENTION};
