//! fleetscale-state — domain types and history storage for fleetscale.
//!
//! Cluster snapshots, instance groups and scaling actions are plain serde
//! types shared by every other crate in the workspace. The `StateStore`
//! persists the per-tick `HistoryRecord`s in [redb](https://docs.rs/redb),
//! JSON-serialized into `&[u8]` value columns.
//!
//! History keys are `{cluster_id}:{recorded_at:020}` so a range scan over a
//! cluster prefix yields records in chronological order.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
