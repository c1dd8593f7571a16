use crate::models::Snapshot;
use rusqlite::{Connection, OptionalExtension, params};
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

const BASELINE_KEY: &str = "baseline";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("time error: {0}")]
    Time(#[from] std::time::SystemTimeError),
}

/// Durable home of the previous cycle's snapshot.
///
/// `read` must only return `Ok(None)` when nothing has been stored; any
/// failure to tell is an error.
pub trait SnapshotStore {
    fn read(&self) -> Result<Option<Snapshot>, StorageError>;
    /// Replaces whatever was stored before.
    fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
    /// Unix seconds of the last successful write, if the backend tracks it
    /// and a snapshot is stored.
    fn written_at(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    File,
}

impl StoreBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "file" | "json" => Some(Self::File),
            _ => None,
        }
    }

    pub fn default_path(self) -> &'static str {
        match self {
            Self::Sqlite => "status-watch.sqlite",
            Self::File => "status-watch-snapshot.json",
        }
    }
}

pub fn open_store(
    backend: StoreBackend,
    path: &Path,
) -> Result<Box<dyn SnapshotStore>, StorageError> {
    let store: Box<dyn SnapshotStore> = match backend {
        StoreBackend::Sqlite => Box::new(SqliteSnapshotStore::open(path)?),
        StoreBackend::File => Box::new(FileSnapshotStore::new(path)),
    };
    Ok(store)
}

/// Keeps the snapshot as a single key-value row.
#[derive(Debug)]
pub struct SqliteSnapshotStore {
    connection: Connection,
}

impl SqliteSnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let connection = Connection::open(path)?;
        let store = Self { connection };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), StorageError> {
        self.connection.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS snapshot_state (
                key TEXT PRIMARY KEY,
                incident_ids_json TEXT NOT NULL,
                updated_at_unix INTEGER NOT NULL
            );
            ",
        )?;

        Ok(())
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn read(&self) -> Result<Option<Snapshot>, StorageError> {
        let encoded: Option<String> = self
            .connection
            .query_row(
                "SELECT incident_ids_json FROM snapshot_state WHERE key = ?1",
                params![BASELINE_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match encoded {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(snapshot)?;
        let updated_at = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        self.connection.execute(
            "
            INSERT INTO snapshot_state (key, incident_ids_json, updated_at_unix)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                incident_ids_json = excluded.incident_ids_json,
                updated_at_unix = excluded.updated_at_unix
            ",
            params![BASELINE_KEY, encoded, updated_at],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.connection.execute(
            "DELETE FROM snapshot_state WHERE key = ?1",
            params![BASELINE_KEY],
        )?;
        Ok(())
    }

    fn written_at(&self) -> Result<Option<u64>, StorageError> {
        let updated_at = self
            .connection
            .query_row(
                "SELECT updated_at_unix FROM snapshot_state WHERE key = ?1",
                params![BASELINE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated_at)
    }
}

/// Keeps the snapshot as a JSON id list on disk. Writes go through a sibling
/// temp file and a rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self) -> Result<Option<Snapshot>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };

        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let encoded = serde_json::to_string_pretty(snapshot)?;
        let staging = self.staging_path();

        fs::write(&staging, encoded).map_err(|error| self.io_error(error))?;
        fs::rename(&staging, &self.path).map_err(|error| self.io_error(error))
    }

    fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(self.io_error(error)),
        }
    }

    fn written_at(&self) -> Result<Option<u64>, StorageError> {
        let modified = match fs::metadata(&self.path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => modified,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(self.io_error(error)),
        };
        Ok(Some(modified.duration_since(UNIX_EPOCH)?.as_secs()))
    }
}
