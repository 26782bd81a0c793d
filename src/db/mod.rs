use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use tokio::sync::oneshot;

pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

use migrations::{check_schema, run_migrations};
pub use models::{SignalLevel, SignalPair, SignalRecord};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to signal store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join signal store thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the SQLite signal store. Every statement runs on one dedicated
/// worker thread; clones share that thread.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

/// Who is opening the store. Only the poller writes; every other process
/// opens read-only and never creates or migrates anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Writer,
    ReadOnly,
}

fn open_connection(path: &Path, mode: AccessMode) -> Result<Connection> {
    let mut conn = match mode {
        AccessMode::Writer => {
            Connection::open(path).context("failed to open SQLite signal store")?
        }
        AccessMode::ReadOnly => Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("no signal store at {}", path.display()))?,
    };

    conn.busy_timeout(BUSY_TIMEOUT)
        .context("failed to set busy timeout")?;

    match mode {
        AccessMode::Writer => {
            // WAL lets readers in other processes run while the poller writes.
            if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                error!("Failed to enable WAL mode: {err}");
            }
            run_migrations(&mut conn).context("failed to run store migrations")?;
        }
        AccessMode::ReadOnly => {
            check_schema(&conn).context("signal store is not ready for reading")?;
        }
    }

    Ok(conn)
}

impl Database {
    /// Opens (creating if needed) the store the poller writes to.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create store directory {}", parent.display())
            })?;
        }
        Self::spawn(db_path, AccessMode::Writer)
    }

    /// Opens an existing, migrated store for reading. Fails instead of
    /// creating an empty one.
    pub fn open_read_only(db_path: PathBuf) -> Result<Self> {
        Self::spawn(db_path, AccessMode::ReadOnly)
    }

    fn spawn(db_path: PathBuf, mode: AccessMode) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("conveyor-db".into())
            .spawn(move || {
                let mut conn = match open_connection(&path_for_thread, mode) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(())).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Signal store thread shutting down");
            })
            .with_context(|| "failed to spawn signal store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!(
            "Signal store opened at {} ({mode:?})",
            db_path.as_path().display()
        );

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn read_only_open_refuses_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.sqlite");

        assert!(Database::open_read_only(path.clone()).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn read_only_open_refuses_unmigrated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.sqlite");
        Connection::open(&path).unwrap();

        assert!(Database::open_read_only(path).is_err());
    }

    #[tokio::test]
    async fn read_only_handle_reads_but_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signal.sqlite");
        let writer = Database::new(path.clone()).unwrap();
        let started = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        writer.initialize_signals(started).await.unwrap();

        let reader = Database::open_read_only(path).unwrap();
        let pair = reader.read_signal_pair().await.unwrap();
        assert_eq!(pair.on.transition_timestamp, started);

        let record = SignalRecord::new(SignalLevel::On, 12.0, started);
        assert!(reader.write_signal(&record).await.is_err());
        assert!(reader.initialize_signals(started).await.is_err());
    }
}
