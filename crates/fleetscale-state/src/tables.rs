//! redb table definitions for the history store.

use redb::TableDefinition;

/// History records keyed by `(cluster_id, recorded_at)`. Tuple keys order
/// by cluster first, so one cluster's records form a contiguous range.
pub const HISTORY: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("history");
