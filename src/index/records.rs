//! Live-row bookkeeping shared by the index backends
//!
//! The table owns the authoritative set of live rows for one collection.
//! Backends keep only their search structure (graph or nothing) and consult
//! the table to resolve row payloads and to skip deleted rows.

use super::{IndexError, IndexRecord};
use crate::storage::Database;
use ahash::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Row maps guarded together so lookups never see half an update
#[derive(Default)]
pub struct Rows {
    by_id: HashMap<u64, IndexRecord>,
    by_product: HashMap<String, Vec<u64>>,
}

impl Rows {
    pub fn get(&self, row_id: u64) -> Option<&IndexRecord> {
        self.by_id.get(&row_id)
    }

    /// Live row matching the optional category prefilter
    pub fn matches(&self, row_id: u64, category: Option<&str>) -> bool {
        match self.by_id.get(&row_id) {
            Some(record) => category.map_or(true, |c| record.category == c),
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &IndexRecord)> {
        self.by_id.iter().map(|(id, record)| (*id, record))
    }

    fn insert(&mut self, row_id: u64, record: IndexRecord) {
        self.by_product
            .entry(record.product_id.clone())
            .or_default()
            .push(row_id);
        self.by_id.insert(row_id, record);
    }

    fn remove_product(&mut self, product_id: &str) -> usize {
        let ids = self.by_product.remove(product_id).unwrap_or_default();
        for id in &ids {
            self.by_id.remove(id);
        }
        ids.len()
    }
}

/// Row table for one collection, optionally written through to SQLite
pub struct RecordTable {
    collection: String,
    rows: RwLock<Rows>,
    next_id: AtomicU64,
    database: Option<Arc<Database>>,
}

impl RecordTable {
    /// Volatile table, lost when dropped
    pub fn in_memory(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            rows: RwLock::new(Rows::default()),
            next_id: AtomicU64::new(1),
            database: None,
        }
    }

    /// Table backed by a database collection. Ensures the collection exists
    /// with `dimension` and loads every stored row.
    pub fn attached(
        collection: impl Into<String>,
        dimension: usize,
        database: Arc<Database>,
    ) -> Result<Self, IndexError> {
        let collection = collection.into();

        database
            .ensure_collection(&collection, dimension)
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let stored = database
            .load_rows(&collection)
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let mut rows = Rows::default();
        let mut max_id = 0;
        for (row_id, record) in stored {
            max_id = max_id.max(row_id);
            rows.insert(row_id, record);
        }

        tracing::info!(
            "Loaded {} rows into collection '{}'",
            rows.by_id.len(),
            collection
        );

        Ok(Self {
            collection,
            rows: RwLock::new(rows),
            next_id: AtomicU64::new(max_id + 1),
            database: Some(database),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn read(&self) -> Result<RwLockReadGuard<'_, Rows>, IndexError> {
        self.rows.read().map_err(|_| self.poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Rows>, IndexError> {
        self.rows.write().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> IndexError {
        IndexError::Unavailable(self.collection.clone(), "row lock poisoned".to_string())
    }

    /// Store a row and return its id
    pub fn insert(&self, record: IndexRecord) -> Result<u64, IndexError> {
        let row_id = match &self.database {
            Some(db) => db
                .insert_row(&self.collection, &record)
                .map_err(|e| IndexError::Storage(e.to_string()))?,
            None => self.next_id.fetch_add(1, Ordering::SeqCst),
        };

        self.write()?.insert(row_id, record);
        Ok(row_id)
    }

    /// Remove every row for `product_id`
    pub fn delete(&self, product_id: &str) -> Result<usize, IndexError> {
        if let Some(db) = &self.database {
            db.delete_product(&self.collection, product_id)
                .map_err(|e| IndexError::Storage(e.to_string()))?;
        }

        Ok(self.write()?.remove_product(product_id))
    }

    pub fn count(&self, product_id: &str) -> Result<usize, IndexError> {
        Ok(self
            .read()?
            .by_product
            .get(product_id)
            .map_or(0, Vec::len))
    }

    pub fn len(&self) -> usize {
        self.read().map(|rows| rows.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> Result<(), IndexError> {
        if let Some(db) = &self.database {
            db.clear_collection(&self.collection)
                .map_err(|e| IndexError::Storage(e.to_string()))?;
        }

        *self.write()? = Rows::default();
        Ok(())
    }
}
