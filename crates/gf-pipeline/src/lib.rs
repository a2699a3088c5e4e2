//! # gf-pipeline
//!
//! The three data-plane components — Ingestor, Join, Sink — built on top
//! of `gf-core`'s component contract, `gf-bus`'s stream/KV abstractions and
//! `gf-schema`'s column mapping, plus the shared processor chain, row
//! conversions and dead-letter plumbing they all use.

pub mod config;
pub mod dlq;
pub mod ingestor;
pub mod join;
pub mod processor;
pub mod row;
pub mod sink;

pub use dlq::{DlqReader, DlqWriter};
pub use ingestor::Ingestor;
pub use join::Join;
pub use sink::Sink;
