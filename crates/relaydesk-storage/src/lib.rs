//! Persistence for the escalation pipeline.
//!
//! [`DeskStore`] wraps a SeaORM connection (SQLite by default) and exposes
//! the narrow query/insert surface the dispatch engine, webhook delivery
//! service and retry sweeps need. The schema lives in the `migration` crate
//! and is brought up to date on connect.

pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};
pub use store::DeskStore;
