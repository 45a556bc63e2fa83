//! Durable storage for encoded frames.
//!
//! [`FrameStore`] maps dense frame ids to encoded payloads. The default
//! implementation, [`SqliteFrameStore`], keeps them in a single SQLite table
//! so a file-backed store outlives the process until it is cleared.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::configuration::StoreLocation;
use crate::error::FrameFlowError;

/// Key/value storage of encoded frames, keyed by frame id.
pub trait FrameStore {
    /// Store `payload` under `id`, replacing any previous payload.
    fn put(&mut self, id: u64, payload: &[u8]) -> Result<(), FrameFlowError>;

    /// Read the payload stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::FrameNotFound`] when nothing is stored there.
    fn get(&self, id: u64) -> Result<Vec<u8>, FrameFlowError>;

    /// Erase every stored frame. Clearing an empty store is a no-op.
    fn clear(&mut self) -> Result<(), FrameFlowError>;

    /// Stored ids in ascending order.
    fn ids(&self) -> Result<Vec<u64>, FrameFlowError>;
}

/// SQLite-backed [`FrameStore`].
///
/// # Example
///
/// ```
/// use frameflow::{FrameStore, SqliteFrameStore};
///
/// let mut store = SqliteFrameStore::open_in_memory()?;
/// store.put(1, b"payload")?;
/// assert_eq!(store.get(1)?, b"payload");
/// store.clear()?;
/// assert!(store.get(1).is_err());
/// # Ok::<(), frameflow::FrameFlowError>(())
/// ```
#[derive(Debug)]
pub struct SqliteFrameStore {
    connection: Connection,
}

impl SqliteFrameStore {
    /// Open (creating if needed) a store backed by the database file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FrameFlowError> {
        log::debug!("Opening frame store at {}", path.as_ref().display());
        Self::initialize(Connection::open(path)?)
    }

    /// Open a private store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, FrameFlowError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    /// Open the store described by `location`.
    pub fn open_location(location: &StoreLocation) -> Result<Self, FrameFlowError> {
        match location {
            StoreLocation::Memory => Self::open_in_memory(),
            StoreLocation::Path(path) => Self::open(path),
        }
    }

    fn initialize(connection: Connection) -> Result<Self, FrameFlowError> {
        connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS frames (
                id INTEGER PRIMARY KEY,
                payload BLOB NOT NULL
            );",
        )?;
        Ok(Self { connection })
    }
}

impl FrameStore for SqliteFrameStore {
    fn put(&mut self, id: u64, payload: &[u8]) -> Result<(), FrameFlowError> {
        self.connection.execute(
            "INSERT OR REPLACE INTO frames (id, payload) VALUES (?1, ?2)",
            params![id as i64, payload],
        )?;
        Ok(())
    }

    fn get(&self, id: u64) -> Result<Vec<u8>, FrameFlowError> {
        self.connection
            .query_row(
                "SELECT payload FROM frames WHERE id = ?1",
                params![id as i64],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?
            .ok_or(FrameFlowError::FrameNotFound(id))
    }

    fn clear(&mut self) -> Result<(), FrameFlowError> {
        self.connection.execute("DELETE FROM frames", [])?;
        Ok(())
    }

    fn ids(&self) -> Result<Vec<u64>, FrameFlowError> {
        let mut statement = self
            .connection
            .prepare("SELECT id FROM frames ORDER BY id")?;
        let ids = statement
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| id as u64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
