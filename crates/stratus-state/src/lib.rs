//! Coordination store access for Stratus.
//!
//! The scheduler treats the store as an opaque versioned key-value
//! substrate: executors publish their cached key sets into it, schedulers
//! persist DAG records and function bodies, and callers poll it for results.
//! Every value carries a timestamp and writes merge last-writer-wins, so
//! replicas racing on the same key converge without coordination.

mod error;
mod traits;
mod types;

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "valkey")]
mod valkey;

#[cfg(feature = "config")]
mod config;

#[cfg(feature = "config")]
mod provider;

pub use error::{KvError, StateError};
pub use traits::KvBackend;
pub use types::Versioned;

#[cfg(feature = "memory")]
pub use memory::MemoryKv;

#[cfg(feature = "valkey")]
pub use valkey::ValkeyKv;

#[cfg(feature = "config")]
pub use config::KvConfig;

#[cfg(feature = "config")]
pub use provider::open_kv;
