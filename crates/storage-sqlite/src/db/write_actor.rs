//! Single-writer actor for the sqlite store.
//!
//! All writes go through one dedicated thread holding one connection, each
//! job wrapped in an immediate transaction: a job either fully commits or
//! fully aborts, so the queue is never observed half-written.

use std::sync::mpsc;
use std::thread;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::error;

use taskstack_core::errors::{DatabaseError, Error, Result};

use crate::db::DbPool;
use crate::errors::StorageError;

type WriteJob = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Transaction-internal error carrier: distinguishes the job's own failure
/// from a commit/rollback failure raised by diesel.
enum TxError {
    Db(diesel::result::Error),
    App(Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Db(err)
    }
}

/// Handle for submitting write jobs to the writer thread.
#[derive(Clone)]
pub struct WriteHandle {
    sender: mpsc::Sender<WriteJob>,
}

impl WriteHandle {
    /// Run `job` inside an immediate transaction on the writer thread and
    /// await its result.
    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let wrapped: WriteJob = Box::new(move |conn| {
            let result = conn
                .immediate_transaction::<T, TxError, _>(|tx_conn| job(tx_conn).map_err(TxError::App))
                .map_err(|err| match err {
                    TxError::Db(db_err) => Error::from(StorageError::from(db_err)),
                    TxError::App(app_err) => app_err,
                });
            let _ = tx.send(result);
        });

        self.sender.send(wrapped).map_err(|_| {
            Error::Database(DatabaseError::Internal("Write actor is gone".to_string()))
        })?;
        rx.await.map_err(|_| {
            Error::Database(DatabaseError::Internal(
                "Write actor dropped the job".to_string(),
            ))
        })?
    }
}

/// Spawn the writer thread over its own pooled connection.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (sender, receiver) = mpsc::channel::<WriteJob>();
    let spawned = thread::Builder::new()
        .name("taskstack-db-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    error!("writer thread could not acquire a connection: {err}");
                    return;
                }
            };
            while let Ok(job) = receiver.recv() {
                job(&mut conn);
            }
        });
    if let Err(err) = spawned {
        error!("failed to spawn writer thread: {err}");
    }
    WriteHandle { sender }
}
