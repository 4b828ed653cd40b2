pub mod kv;

pub use kv::{KvStore, MemoryStore, StoreError};

#[cfg(feature = "rocksdb")]
pub use kv::RocksStore;
