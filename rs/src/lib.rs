//! ResultStore - durable, append-only persistence for completed batch results
//!
//! The store keeps two representations of the same data:
//!
//! - a line-delimited JSON log (`<output>.jsonl`), the source of truth -
//!   one fsynced line per completed result, so the log is parseable after
//!   every individual append and survives the process being killed between
//!   (or during) writes
//! - a JSON array file (`<output>.json`), the interchange shape - rebuilt
//!   from the log via temp-file + atomic rename, so it is never observed
//!   half-written
//!
//! Opening a store acquires an exclusive advisory lock; a second process
//! pointed at the same output path fails fast instead of interleaving
//! writes.

pub mod error;
pub mod record;
pub mod store;

pub use error::StoreError;
pub use record::ResultRecord;
pub use store::ResultStore;
