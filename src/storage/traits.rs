//! Abstract storage contract.
//!
//! Both tiers key arrays by exact period. An eternal storage collapses every
//! key onto [`Period::eternity`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::Period;
use crate::value::Array;

/// Errors raised by a storage tier.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is not a readable `.npy` array.
    #[error("Invalid npy data in {path}: {reason}")]
    Codec { path: PathBuf, reason: String },

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Footprint of a storage tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Stored arrays.
    pub nb_arrays: usize,
    /// Bytes across every stored array.
    pub total_nb_bytes: usize,
    /// Bytes per cell of the stored arrays; zero when empty.
    pub cell_size: usize,
}

/// A period-keyed array store.
pub trait ArrayStorage: Send {
    /// Exact-key lookup.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the backend cannot be read.
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError>;

    /// Stores `value` under `period`, replacing any previous array.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the backend cannot be written.
    fn put(&mut self, period: Period, value: Array) -> Result<(), StorageError>;

    /// Removes everything (`None`) or every entry contained in `period`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when a backing file cannot be removed.
    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError>;

    /// Periods with a stored array.
    fn known_periods(&self) -> Vec<Period>;

    /// Current footprint.
    fn usage(&self) -> StorageUsage;

    /// True when an array is stored for `period`.
    fn contains(&self, period: &Period) -> bool;
}

/// Storage key for `period`.
pub(crate) fn storage_key(period: &Period, is_eternal: bool) -> Period {
    if is_eternal {
        Period::eternity()
    } else {
        *period
    }
}
