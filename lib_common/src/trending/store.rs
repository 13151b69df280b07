//! The persistent game-record store.
//!
//! One JSON document (`{"games":[...]}`) holds every trackable game. Writes
//! always replace the whole document and go through a temp file in the same
//! directory that is renamed over the target, so a reader can never observe
//! a partially written store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Tie-break value assigned to records that have not been cheered since
/// another game matched their bits total.
pub const DEFAULT_PRIORITY: i32 = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a non-empty game id matching the record is required")]
    BadArgs,
}

/// One trackable game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub game_name: String,
    pub total_bits: u64,
    pub priority: i32,
}

/// The whole store document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameDb {
    pub games: Vec<GameRecord>,
}

impl GameDb {
    pub fn get(&self, id: &str) -> Option<&GameRecord> {
        self.games.iter().find(|game| game.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut GameRecord> {
        self.games.iter_mut().find(|game| game.id == id)
    }

    /// Replaces the record with the same id, or appends it.
    pub fn upsert(&mut self, record: GameRecord) {
        match self.get_mut(&record.id) {
            Some(existing) => *existing = record,
            None => self.games.push(record),
        }
    }
}

pub struct TrendingStore {
    db_path: PathBuf,
}

impl TrendingStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Loads and returns the full current document.
    pub fn read_all(&self) -> Result<GameDb, StoreError> {
        let raw = fs::read_to_string(&self.db_path).map_err(|source| StoreError::Read {
            path: self.db_path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
            path: self.db_path.clone(),
            source,
        })
    }

    /// Point read; an unknown id is an ordinary `None`, not an error.
    pub fn read_one(&self, id: &str) -> Result<Option<GameRecord>, StoreError> {
        Ok(self.read_all()?.get(id).cloned())
    }

    /// Atomically replaces the whole document.
    pub fn replace(&self, db: &GameDb) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(db).map_err(|source| StoreError::Write {
            path: self.db_path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;

        // Temp file in the store's own directory so the rename stays on one
        // filesystem and the old document survives an interrupted write.
        let dir = self
            .db_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| StoreError::Write {
            path: self.db_path.clone(),
            source,
        })?;
        tmp.write_all(body.as_bytes())
            .map_err(|source| StoreError::Write {
                path: self.db_path.clone(),
                source,
            })?;
        tmp.persist(&self.db_path)
            .map_err(|source| StoreError::Write {
                path: self.db_path.clone(),
                source: source.error,
            })?;
        Ok(())
    }

    /// Upserts one record and writes the document back.
    ///
    /// The id must be non-empty and match the record it keys; anything else
    /// is a caller bug and fails fast.
    pub fn patch(&self, id: &str, record: GameRecord) -> Result<GameDb, StoreError> {
        if id.trim().is_empty() || record.id != id {
            return Err(StoreError::BadArgs);
        }
        let mut db = self.read_all()?;
        db.upsert(record);
        self.replace(&db)?;
        Ok(db)
    }
}
