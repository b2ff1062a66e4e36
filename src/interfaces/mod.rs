//! Batch interfaces through which external collaborators drive the ledger.

pub mod csv;
