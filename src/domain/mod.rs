//! Domain types and ports for the wallet ledger and loan interest core.

pub mod loan;
pub mod money;
pub mod ports;
pub mod transfer;
pub mod wallet;
