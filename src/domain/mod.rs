//! Domain layer: value objects, the account entity, operation intents and
//! the storage/consistency ports the engine is written against.

pub mod account;
pub mod operation;
pub mod ports;
