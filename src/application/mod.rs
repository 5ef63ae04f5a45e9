//! Application layer orchestrating the core business operations.
//!
//! Each engine opens one atomic unit of work per operation, performs every
//! read and write through the ledger store ports inside it, and returns a
//! typed result or error.

pub mod interest;
pub mod transfer;
pub mod wallet;
