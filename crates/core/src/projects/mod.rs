//! Project/task domain models.

mod model;

pub use model::*;
