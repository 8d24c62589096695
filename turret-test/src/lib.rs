//! Test utilities for Turret.
//!
//! [`MemoryAdapter`] stores entities in process memory, records every call in
//! a [`Journal`] and can be told to fail at chosen [`FailPoint`]s.

mod fault;
mod journal;
mod memory;

pub use fault::{FailPoint, Faults, InjectedFault};
pub use journal::{Event, Journal};
pub use memory::{entity, MemoryAdapter, MemorySession};

use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to `warn,turret_data=debug`. Safe to call
/// from every test; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,turret_data=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
