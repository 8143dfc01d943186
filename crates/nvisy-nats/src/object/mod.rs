//! NATS object storage of values too large for KV.

mod object_store;

pub use object_store::ObjectStore;
