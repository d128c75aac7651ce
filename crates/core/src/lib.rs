//! Core domain models and the offline-first sync engine for taskstack.
//!
//! The crate is I/O-free: durable storage and the remote API are injected
//! through the [`sync::OfflineRepositoryTrait`] and [`sync::RemoteExecutor`]
//! contracts, with implementations living in sibling crates.

pub mod errors;
pub mod projects;
pub mod sync;

pub use errors::{Error, Result};
