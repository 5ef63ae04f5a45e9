//! CSV surface for the batch CLI: an operation reader and a balance writer.

pub mod balance_writer;
pub mod operation_reader;
