//! Offline queue and snapshot persistence.

mod model;
mod repository;

pub use model::*;
pub use repository::*;
