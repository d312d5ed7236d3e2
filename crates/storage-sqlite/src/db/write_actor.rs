use super::DbPool;
use crate::errors::StorageError;
use coinpulse_core::errors::{Error, Result, StorageFailure};
use diesel::SqliteConnection;
use log::error;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// A write job runs against the actor's connection inside an immediate transaction.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type AnyResult = Result<Box<dyn Any + Send + 'static>>;

/// Bound on queued write jobs.
const QUEUE_CAPACITY: usize = 1024;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    // Return types are erased through `Box<dyn Any>` so one channel carries every job.
    tx: mpsc::Sender<(Job<Box<dyn Any + Send + 'static>>, oneshot::Sender<AnyResult>)>,
}

impl WriteHandle {
    /// Executes `job` on the writer actor's dedicated connection.
    ///
    /// Jobs run one at a time, each in its own immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| writer_stopped())?;

        let boxed = ret_rx.await.map_err(|_| writer_stopped())??;
        boxed.downcast::<T>().map(|v| *v).map_err(|_| {
            Error::Storage(StorageFailure::Internal(
                "writer actor returned an unexpected result type".to_string(),
            ))
        })
    }
}

fn writer_stopped() -> Error {
    Error::Storage(StorageFailure::Internal(
        "database writer is not running".to_string(),
    ))
}

/// Spawns a background task that acts as the single writer to the database.
///
/// The actor holds one pooled connection for its lifetime and processes jobs
/// serially. It stops once every [`WriteHandle`] is dropped.
pub fn spawn_writer(pool: Arc<DbPool>) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<AnyResult>,
    )>(QUEUE_CAPACITY);

    tokio::spawn(async move {
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                // Dropping `rx` makes every pending and future `exec` fail.
                error!("Writer actor could not acquire a database connection: {}", e);
                return;
            }
        };

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: AnyResult = conn
                .immediate_transaction::<_, StorageError, _>(|c| job(c).map_err(StorageError::from))
                .map_err(Error::from);

            // The requester may have gone away; nothing to do then.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}
