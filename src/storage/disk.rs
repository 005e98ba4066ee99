//! On-disk storage tier.
//!
//! One directory per variable; one `<canonical period>.npy` file per stored
//! period. The directory is removed when the storage is dropped unless it was
//! created with `preserve` set.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::storage::npy;
use crate::storage::traits::{storage_key, ArrayStorage, StorageError, StorageUsage};
use crate::time::Period;
use crate::value::Array;

const EXTENSION: &str = "npy";

/// Arrays persisted as `.npy` files.
#[derive(Debug)]
pub struct OnDiskStorage {
    directory: PathBuf,
    is_eternal: bool,
    preserve: bool,
    files: HashMap<Period, PathBuf>,
    cell_size: usize,
}

impl OnDiskStorage {
    /// Opens (creating if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` when the directory cannot be created.
    pub fn new(
        directory: impl Into<PathBuf>,
        is_eternal: bool,
        preserve: bool,
    ) -> Result<Self, StorageError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| StorageError::io(&directory, e))?;
        Ok(Self {
            directory,
            is_eternal,
            preserve,
            files: HashMap::new(),
            cell_size: 0,
        })
    }

    /// Directory holding the `.npy` files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// True when every period maps to a single slot.
    #[must_use]
    pub const fn is_eternal(&self) -> bool {
        self.is_eternal
    }

    fn path_for(&self, period: &Period) -> PathBuf {
        self.directory.join(format!("{period}.{EXTENSION}"))
    }

    /// Rebuilds the index from the files already in the directory.
    ///
    /// Files whose stem is not a canonical period are ignored. Returns the
    /// number of arrays found.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` when the directory cannot be listed.
    pub fn restore(&mut self) -> Result<usize, StorageError> {
        self.files.clear();
        let entries = fs::read_dir(&self.directory).map_err(|e| StorageError::io(&self.directory, e))?;
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io(&self.directory, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<Period>() {
                Ok(period) => {
                    self.files.insert(storage_key(&period, self.is_eternal), path);
                }
                Err(err) => debug!(file = %path.display(), error = %err, "skipping unrecognized file"),
            }
        }
        Ok(self.files.len())
    }

    fn remove_file(path: &Path) -> Result<(), StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

impl ArrayStorage for OnDiskStorage {
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError> {
        match self.files.get(&storage_key(period, self.is_eternal)) {
            Some(path) => npy::read_array(path).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, period: Period, value: Array) -> Result<(), StorageError> {
        let key = storage_key(&period, self.is_eternal);
        let path = self.path_for(&key);
        npy::write_array(&path, &value)?;
        self.cell_size = value.value_type().cell_size();
        self.files.insert(key, path);
        Ok(())
    }

    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError> {
        let doomed: Vec<Period> = match period {
            None => self.files.keys().copied().collect(),
            Some(period) => {
                let period = storage_key(period, self.is_eternal);
                self.files
                    .keys()
                    .filter(|key| period.contains(key))
                    .copied()
                    .collect()
            }
        };
        for key in doomed {
            if let Some(path) = self.files.remove(&key) {
                Self::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn known_periods(&self) -> Vec<Period> {
        self.files.keys().copied().collect()
    }

    fn usage(&self) -> StorageUsage {
        StorageUsage {
            nb_arrays: self.files.len(),
            total_nb_bytes: self
                .files
                .values()
                .filter_map(|path| fs::metadata(path).ok())
                .map(|meta| usize::try_from(meta.len()).unwrap_or(usize::MAX))
                .sum(),
            cell_size: if self.files.is_empty() { 0 } else { self.cell_size },
        }
    }

    fn contains(&self, period: &Period) -> bool {
        self.files.contains_key(&storage_key(period, self.is_eternal))
    }
}

impl Drop for OnDiskStorage {
    fn drop(&mut self) {
        if self.preserve {
            return;
        }
        match fs::remove_dir_all(&self.directory) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                directory = %self.directory.display(),
                error = %e,
                "failed to remove storage directory"
            ),
        }
    }
}
