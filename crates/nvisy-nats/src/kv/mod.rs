//! NATS Key-Value storage of small JSON records.

mod kv_store;

pub use kv_store::KvStore;
