//! # gf-bus
//!
//! JetStream-backed message bus and key-value store, plus in-memory fakes
//! of both used by component tests and the `demo` runner role.

pub mod kv_store;
pub mod memory;
pub mod nats;
pub mod stream_bus;

pub use kv_store::KvStore;
pub use memory::{MemoryKvStore, MemoryStreamBus};
pub use nats::{NatsKvStore, NatsStreamBus};
pub use stream_bus::{FetchedBatch, StreamBus};
