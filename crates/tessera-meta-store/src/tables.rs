//! Redb table definitions for persistent metadata storage.

use redb::TableDefinition;

// Key: "<bucket_id>/<key>", Value: opaque record bytes
pub const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
