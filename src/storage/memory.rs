//! In-memory storage tier.

use std::collections::HashMap;

use crate::storage::traits::{storage_key, ArrayStorage, StorageError, StorageUsage};
use crate::time::Period;
use crate::value::Array;

/// Arrays kept in a hash map keyed by period.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    arrays: HashMap<Period, Array>,
    is_eternal: bool,
}

impl InMemoryStorage {
    /// An empty store. Eternal stores keep a single array for every period.
    #[must_use]
    pub fn new(is_eternal: bool) -> Self {
        Self {
            arrays: HashMap::new(),
            is_eternal,
        }
    }

    /// True when every period maps to a single slot.
    #[must_use]
    pub const fn is_eternal(&self) -> bool {
        self.is_eternal
    }

    /// Borrowing lookup, avoiding a clone on cache hits.
    #[must_use]
    pub fn peek(&self, period: &Period) -> Option<&Array> {
        self.arrays.get(&storage_key(period, self.is_eternal))
    }
}

impl ArrayStorage for InMemoryStorage {
    fn get(&self, period: &Period) -> Result<Option<Array>, StorageError> {
        Ok(self.peek(period).cloned())
    }

    fn put(&mut self, period: Period, value: Array) -> Result<(), StorageError> {
        self.arrays
            .insert(storage_key(&period, self.is_eternal), value);
        Ok(())
    }

    fn delete(&mut self, period: Option<&Period>) -> Result<(), StorageError> {
        match period {
            None => self.arrays.clear(),
            Some(period) => {
                let period = storage_key(period, self.is_eternal);
                self.arrays.retain(|key, _| !period.contains(key));
            }
        }
        Ok(())
    }

    fn known_periods(&self) -> Vec<Period> {
        self.arrays.keys().copied().collect()
    }

    fn usage(&self) -> StorageUsage {
        let Some(first) = self.arrays.values().next() else {
            return StorageUsage::default();
        };
        StorageUsage {
            nb_arrays: self.arrays.len(),
            total_nb_bytes: self.arrays.values().map(Array::nbytes).sum(),
            cell_size: first.value_type().cell_size(),
        }
    }

    fn contains(&self, period: &Period) -> bool {
        self.peek(period).is_some()
    }
}
