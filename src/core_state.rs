//! Shared application state: the database connection and the resolved config.
//!
//! Wrapped in `Arc` at startup. The connection sits behind a std `Mutex`;
//! callers keep the guard for short synchronous sections only and never
//! across an `.await`.

use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::clinical::reference::{bootstrap_catalog, LabCatalog};
use crate::clinical::ClinicalError;
use crate::config::AppConfig;
use crate::db;

pub struct CoreState {
    db: Mutex<Connection>,
    pub config: AppConfig,
}

impl CoreState {
    /// Opens (and migrates) the database at `config.db_path`, then seeds
    /// the lab catalog if the database has none.
    pub fn open(config: AppConfig) -> Result<Self, CoreError> {
        let conn = db::open_database(&config.db_path)?;
        tracing::info!(path = %config.db_path.display(), "Database opened");
        Self::with_connection(conn, config)
    }

    /// In-memory database, same bootstrap as `open`.
    pub fn in_memory(config: AppConfig) -> Result<Self, CoreError> {
        Self::with_connection(db::open_memory_database()?, config)
    }

    fn with_connection(conn: Connection, config: AppConfig) -> Result<Self, CoreError> {
        let catalog = match &config.catalog_path {
            Some(path) => LabCatalog::load(path)?,
            None => LabCatalog::bundled()?,
        };
        bootstrap_catalog(&conn, &catalog)?;

        Ok(Self {
            db: Mutex::new(conn),
            config,
        })
    }

    pub fn lock_db(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.db.lock().map_err(|_| CoreError::LockPoisoned)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Reference data error: {0}")]
    Catalog(#[from] ClinicalError),
}
