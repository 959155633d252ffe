//! Cache layer: key derivation, the key-value store boundary, and the
//! synchronization engine that keeps derived entries consistent with the
//! persistent store.

pub mod keys;
pub mod store;
pub mod sync;

pub use store::{CacheStore, CacheStoreError, CacheValue, MemoryCacheStore};
pub use sync::{CacheSyncEngine, RefreshTarget, SyncError};
