//! unit-trace: traceability for manufactured units
//!
//! Units get a one-time scannable identity, an append-only production history
//! and a quality record. Scanning the identity token later reconstructs the
//! whole history in one consistent read.

pub mod cli;
pub mod core;
pub mod entities;
