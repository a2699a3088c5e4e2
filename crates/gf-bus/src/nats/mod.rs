//! JetStream-backed implementations of `StreamBus` and `KvStore`.

mod ack;
mod kv;
mod stream;

pub use kv::NatsKvStore;
pub use stream::NatsStreamBus;
