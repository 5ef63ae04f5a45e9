//! Adapters backing the domain ports.

pub mod in_memory;
pub mod references;
