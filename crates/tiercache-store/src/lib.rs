//! # Tiercache Store
//!
//! The distributed tier: the envelope codec that turns values into stored
//! bytes, the [`DistributedStore`] contract, and its Redis and in-memory
//! implementations.

pub mod codec;
pub mod memory;
pub mod metrics;
pub mod redis;
pub mod store;

pub use codec::{CacheEntry, Codec, EncodedValue, FORMAT_VERSION};
pub use memory::MemoryStore;
pub use self::redis::{build_pool, create_pool, RedisStore};
pub use store::{validate_ttl, DistributedStore, StoreResult};
