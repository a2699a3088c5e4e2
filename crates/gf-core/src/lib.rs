//! # gf-core
//!
//! Foundational types and abstractions shared by every data-plane
//! component: the message envelope, the batch a processor chain operates
//! on, deterministic stream/subject naming, Go-style duration parsing,
//! the component start/stop contract, and the error/retry/config plumbing
//! every Ingestor, Join and Sink is built from.

pub mod batch;
pub mod component;
pub mod config;
pub mod dlq;
pub mod duration;
pub mod error;
pub mod message;
pub mod pipeline_id;
pub mod retry;
pub mod signal;

pub use batch::{Batch, Disposition, FatalError};
pub use component::{Component, ComponentHandle, StopOptions, StopSignal};
pub use dlq::{DlqRecord, DlqState};
pub use duration::GoDuration;
pub use error::GfError;
pub use message::{AckHandle, Headers, Message, Origin};
pub use signal::{ComponentKind, ComponentSignal, SignalReason};
