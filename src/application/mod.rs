//! Application layer containing the core business logic orchestration.
//!
//! This module defines the `LedgerEngine`, the entry point for balance
//! lookups, deposits, withdrawals and transfers. The engine is stateless:
//! every operation runs inside a transaction scope obtained from the
//! account store, so it is safe to call from many tasks concurrently.

pub mod engine;
