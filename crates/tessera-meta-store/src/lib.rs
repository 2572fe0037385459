//! Tessera Metadata Store - key-value adapter for bucket and object metadata
//!
//! Every bucket's metadata lives in its own keyspace, addressed by a bucket
//! id. Keys are opaque strings ordered by byte value; values are opaque
//! bytes (bincode-encoded records in practice). Two backends are provided:
//! an in-process [`MemoryStore`] and a persistent [`RedbStore`].

pub mod memory;
pub mod redb_store;
pub mod store;
mod tables;

// Re-exports
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::{
    KeyEntry, ListOptions, MetaStoreError, MetaStoreResult, MetadataStore, decode_record,
    encode_record,
};
