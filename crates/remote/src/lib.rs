//! GraphQL remote executor for the taskstack sync core.
//!
//! Implements [`taskstack_core::sync::RemoteExecutor`] against the backend's
//! query/mutation protocol. The sync engine resolves placeholder identities
//! before calling in, so every request here carries canonical server ids.

mod client;
mod error;
mod types;

pub use client::{RemoteClient, RemoteConfig};
pub use error::{RemoteApiError, Result};
