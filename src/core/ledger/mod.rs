//! Ledger store backends
//!
//! - `memory` - in-process store with fault injection, used by tests and replay
//! - `postgres` - PostgreSQL store for deployments

pub mod memory;
pub mod postgres;

pub use memory::{FaultStage, MemoryLedger};
pub use postgres::PgLedger;
