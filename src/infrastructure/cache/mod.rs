//! TTL key-value stores backing lockout counters and flags
//!
//! `RedisTtlStore` is shared between instances; `MemoryTtlStore` is for a
//! single process and for tests. The variant is chosen once at startup.

mod memory_store;
mod redis_store;

pub use memory_store::MemoryTtlStore;
pub use redis_store::RedisTtlStore;
