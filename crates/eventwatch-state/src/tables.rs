//! redb table definitions for the status store.

use redb::TableDefinition;

/// Status rows keyed by `{function}\0{timestamp_ms:020}\0{seq:020}`.
pub const STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("status");

/// Monotonic counters; `status` holds the last sequence number handed out.
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
