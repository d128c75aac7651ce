//! SQLite-backed durable store for the taskstack sync core.
//!
//! Persists the pending mutation queue and the cached project snapshot so
//! an offline session survives process restarts. When the storage medium
//! cannot be opened the store degrades to silent no-ops instead of failing
//! the rest of the system.

pub mod db;
pub mod errors;
pub mod offline;
pub mod schema;

pub use offline::OfflineRepository;
