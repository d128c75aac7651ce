//! Database row models for the offline store tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::pending_mutations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PendingMutationDB {
    pub id: String,
    pub kind: String,
    pub payload: String,
    pub timestamp: i64,
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::snapshot_projects)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotProjectDB {
    pub id: String,
    pub ord: i32,
    pub payload: String,
}
