//! fleetscale-core — scaling configuration and the cluster registry.
//!
//! `ScalingConfig` is read from TOML through `ConfigStore`, which writes the
//! defaults on first start. `ClusterRegistry` lists the clusters the daemon
//! knows about, in file order. `SettingsHandle` publishes the current
//! configuration over a watch channel so the loop can pick up edits between
//! ticks.

pub mod config;
pub mod error;
pub mod registry;
pub mod settings;

pub use config::{ConfigStore, ScalingConfig};
pub use error::ConfigError;
pub use registry::ClusterRegistry;
pub use settings::SettingsHandle;
