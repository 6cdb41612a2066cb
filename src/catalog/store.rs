//! Dual store: two modality indexes kept consistent by `product_id`
//!
//! Writes are not transactional. Each step is a separate index call and
//! nothing is rolled back, so every failure after the first mutating step
//! surfaces as [`StoreError::PartialWrite`] naming the side that failed.
//!
//! Known gap: there is no cross-call locking. Two concurrent `upsert`s for
//! the same `product_id` can interleave their delete/insert steps and leave
//! zero or two generations of the record behind.

use super::item::{CatalogItem, Modality};
use crate::index::{check_vector, IndexError, IndexRecord, VectorIndex, WriteHandle};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Write operation that was in progress when a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOp {
    Insert,
    Upsert,
    Delete,
}

/// Step within a write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStage {
    Delete,
    Insert,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteOp::Insert => "insert",
            WriteOp::Upsert => "upsert",
            WriteOp::Delete => "delete",
        })
    }
}

impl fmt::Display for WriteStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WriteStage::Delete => "delete",
            WriteStage::Insert => "insert",
        })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The first step failed; neither index was changed
    #[error("{modality} index unavailable: {source}")]
    IndexUnavailable {
        modality: Modality,
        #[source]
        source: IndexError,
    },

    /// At least one index was changed before `failed` errored
    #[error("partial {op} failure: {failed} index failed at {stage} step: {source}")]
    PartialWrite {
        op: WriteOp,
        stage: WriteStage,
        failed: Modality,
        #[source]
        source: IndexError,
    },

    /// An embedding does not match its index dimension; nothing was written
    #[error("{modality} embedding has dimension {actual}, index expects {expected}")]
    DimensionMismatch {
        modality: Modality,
        expected: usize,
        actual: usize,
    },

    /// An embedding has a non-finite component or magnitude; nothing was written
    #[error("{modality} embedding rejected: {source}")]
    InvalidEmbedding {
        modality: Modality,
        #[source]
        source: IndexError,
    },
}

impl StoreError {
    /// Side that needs a retry, for partial failures
    pub fn failed_side(&self) -> Option<Modality> {
        match self {
            StoreError::PartialWrite { failed, .. } => Some(*failed),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, StoreError::PartialWrite { .. })
    }
}

/// Rows removed from each index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub text_deleted: usize,
    pub image_deleted: usize,
}

impl DeleteReport {
    pub fn total(&self) -> usize {
        self.text_deleted + self.image_deleted
    }
}

/// Successful write to both indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    pub text: WriteHandle,
    pub image: WriteHandle,
    /// Rows removed first (always zero for a plain insert)
    pub replaced: DeleteReport,
}

/// Text and image indexes presented as one catalog keyed by `product_id`
pub struct DualStore {
    text_index: Arc<dyn VectorIndex>,
    image_index: Arc<dyn VectorIndex>,
}

impl DualStore {
    pub fn new(text_index: Arc<dyn VectorIndex>, image_index: Arc<dyn VectorIndex>) -> Self {
        Self {
            text_index,
            image_index,
        }
    }

    pub fn index(&self, modality: Modality) -> &Arc<dyn VectorIndex> {
        match modality {
            Modality::Text => &self.text_index,
            Modality::Image => &self.image_index,
        }
    }

    /// Insert into both indexes without checking for an existing row.
    ///
    /// Not idempotent: inserting the same `product_id` twice leaves two rows
    /// per index. Use [`upsert`](Self::upsert) for retries.
    pub fn insert(&self, item: &CatalogItem) -> Result<WriteReceipt, StoreError> {
        self.validate(item)?;
        self.insert_both(item, WriteOp::Insert, false)
    }

    /// Delete any rows for the product in both indexes, then insert.
    ///
    /// Steps run strictly in order: delete-text, delete-image, insert-text,
    /// insert-image. A failure after the deletes leaves the product absent
    /// rather than duplicated.
    pub fn upsert(&self, item: &CatalogItem) -> Result<WriteReceipt, StoreError> {
        self.validate(item)?;
        debug!("Upsert: deleting existing rows for {}", item.product_id);

        let text_deleted =
            self.text_index
                .delete(&item.product_id)
                .map_err(|source| StoreError::IndexUnavailable {
                    modality: Modality::Text,
                    source,
                })?;

        let image_deleted = self.image_index.delete(&item.product_id).map_err(|source| {
            warn!(
                "Upsert of {} stopped after text delete: image delete failed",
                item.product_id
            );
            StoreError::PartialWrite {
                op: WriteOp::Upsert,
                stage: WriteStage::Delete,
                failed: Modality::Image,
                source,
            }
        })?;

        let mut receipt = self.insert_both(item, WriteOp::Upsert, true)?;
        receipt.replaced = DeleteReport {
            text_deleted,
            image_deleted,
        };
        Ok(receipt)
    }

    /// Remove the product from both indexes.
    ///
    /// A text-side failure changes nothing; an image-side failure after a
    /// successful text delete is a partial failure and only the image side
    /// needs a retry.
    pub fn delete(&self, product_id: &str) -> Result<DeleteReport, StoreError> {
        let text_deleted =
            self.text_index
                .delete(product_id)
                .map_err(|source| StoreError::IndexUnavailable {
                    modality: Modality::Text,
                    source,
                })?;

        let image_deleted = self.image_index.delete(product_id).map_err(|source| {
            warn!(
                "Delete of {} removed {} text rows but image delete failed",
                product_id, text_deleted
            );
            StoreError::PartialWrite {
                op: WriteOp::Delete,
                stage: WriteStage::Delete,
                failed: Modality::Image,
                source,
            }
        })?;

        debug!(
            "Deleted {}: {} text rows, {} image rows",
            product_id, text_deleted, image_deleted
        );

        Ok(DeleteReport {
            text_deleted,
            image_deleted,
        })
    }

    /// Best-effort dedup gate: point lookup against the text index.
    /// Racy under concurrent ingestion of the same id.
    pub fn exists(&self, product_id: &str) -> Result<bool, StoreError> {
        self.text_index
            .exists(product_id)
            .map_err(|source| StoreError::IndexUnavailable {
                modality: Modality::Text,
                source,
            })
    }

    /// Exact-match row count for a product in one index
    pub fn count(&self, product_id: &str, modality: Modality) -> Result<usize, StoreError> {
        self.index(modality)
            .count(product_id)
            .map_err(|source| StoreError::IndexUnavailable { modality, source })
    }

    /// Drop every row from both indexes
    pub fn clear(&self) -> Result<(), StoreError> {
        self.text_index
            .clear()
            .map_err(|source| StoreError::IndexUnavailable {
                modality: Modality::Text,
                source,
            })?;
        self.image_index
            .clear()
            .map_err(|source| StoreError::PartialWrite {
                op: WriteOp::Delete,
                stage: WriteStage::Delete,
                failed: Modality::Image,
                source,
            })
    }

    fn validate(&self, item: &CatalogItem) -> Result<(), StoreError> {
        for modality in [Modality::Text, Modality::Image] {
            let expected = self.index(modality).dimension();
            let actual = item.embedding(modality).len();
            if expected != actual {
                return Err(StoreError::DimensionMismatch {
                    modality,
                    expected,
                    actual,
                });
            }
            check_vector(expected, item.embedding(modality))
                .map_err(|source| StoreError::InvalidEmbedding { modality, source })?;
        }
        Ok(())
    }

    fn record(item: &CatalogItem, modality: Modality) -> IndexRecord {
        IndexRecord {
            product_id: item.product_id.clone(),
            embedding: item.embedding(modality).to_vec(),
            category: item.category.clone(),
            metadata: item.metadata.clone(),
        }
    }

    /// Text then image. `after_delete` marks the text insert as a partial
    /// failure too, since the deletes already went through.
    fn insert_both(
        &self,
        item: &CatalogItem,
        op: WriteOp,
        after_delete: bool,
    ) -> Result<WriteReceipt, StoreError> {
        let text = self
            .text_index
            .insert(Self::record(item, Modality::Text))
            .map_err(|source| {
                if after_delete {
                    StoreError::PartialWrite {
                        op,
                        stage: WriteStage::Insert,
                        failed: Modality::Text,
                        source,
                    }
                } else {
                    StoreError::IndexUnavailable {
                        modality: Modality::Text,
                        source,
                    }
                }
            })?;

        let image = self
            .image_index
            .insert(Self::record(item, Modality::Image))
            .map_err(|source| {
                warn!(
                    "{} of {} left a text-only row: image insert failed",
                    op, item.product_id
                );
                StoreError::PartialWrite {
                    op,
                    stage: WriteStage::Insert,
                    failed: Modality::Image,
                    source,
                }
            })?;

        debug!(
            "Inserted {} into both indexes (rows {} / {})",
            item.product_id, text.row_id, image.row_id
        );

        Ok(WriteReceipt {
            text,
            image,
            replaced: DeleteReport::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Metadata;
    use crate::index::{FlatIndex, IndexHit};
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Flat index whose inserts or deletes can be switched to fail
    struct FlakyIndex {
        inner: FlatIndex,
        fail_insert: AtomicBool,
        fail_delete: AtomicBool,
    }

    impl FlakyIndex {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: FlatIndex::new(name, 2),
                fail_insert: AtomicBool::new(false),
                fail_delete: AtomicBool::new(false),
            })
        }

        fn down(&self) -> IndexError {
            IndexError::Unavailable(self.inner.name().to_string(), "connection refused".into())
        }
    }

    impl VectorIndex for FlakyIndex {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn insert(&self, record: IndexRecord) -> Result<WriteHandle, IndexError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(self.down());
            }
            self.inner.insert(record)
        }
        fn delete(&self, product_id: &str) -> Result<usize, IndexError> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(self.down());
            }
            self.inner.delete(product_id)
        }
        fn search(
            &self,
            query: &[f32],
            k: usize,
            category: Option<&str>,
        ) -> Result<Vec<IndexHit>, IndexError> {
            self.inner.search(query, k, category)
        }
        fn count(&self, product_id: &str) -> Result<usize, IndexError> {
            self.inner.count(product_id)
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
        fn clear(&self) -> Result<(), IndexError> {
            self.inner.clear()
        }
    }

    fn item(product_id: &str) -> CatalogItem {
        CatalogItem::new(
            product_id,
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            "dress",
            Metadata::new(),
        )
    }

    fn setup() -> (DualStore, Arc<FlakyIndex>, Arc<FlakyIndex>) {
        let text = FlakyIndex::new("text");
        let image = FlakyIndex::new("image");
        let store = DualStore::new(text.clone(), image.clone());
        (store, text, image)
    }

    #[test]
    fn test_insert_writes_both_sides() {
        let (store, _, _) = setup();
        let receipt = store.insert(&item("p1")).unwrap();

        assert_eq!(receipt.replaced.total(), 0);
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);
        assert!(store.exists("p1").unwrap());
    }

    #[test]
    fn test_raw_insert_is_not_idempotent() {
        let (store, _, _) = setup();
        store.insert(&item("p1")).unwrap();
        store.insert(&item("p1")).unwrap();

        assert_eq!(store.count("p1", Modality::Text).unwrap(), 2);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 2);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let (store, _, _) = setup();
        store.insert(&item("p1")).unwrap();
        store.insert(&item("p1")).unwrap();

        let first = store.upsert(&item("p1")).unwrap();
        assert_eq!(first.replaced.text_deleted, 2);
        assert_eq!(first.replaced.image_deleted, 2);

        let second = store.upsert(&item("p1")).unwrap();
        assert_eq!(second.replaced.total(), 2);
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);
    }

    #[test]
    fn test_image_insert_failure_is_partial() {
        let (store, _, image) = setup();
        image.fail_insert.store(true, Ordering::SeqCst);

        let err = store.insert(&item("p1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PartialWrite {
                op: WriteOp::Insert,
                stage: WriteStage::Insert,
                failed: Modality::Image,
                ..
            }
        ));
        assert_eq!(err.failed_side(), Some(Modality::Image));

        // Text-only row is left behind, not rolled back
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 0);
    }

    #[test]
    fn test_text_insert_failure_changes_nothing() {
        let (store, text, _) = setup();
        text.fail_insert.store(true, Ordering::SeqCst);

        let err = store.insert(&item("p1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexUnavailable {
                modality: Modality::Text,
                ..
            }
        ));
        assert!(!err.is_partial());
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 0);
    }

    #[test]
    fn test_upsert_failure_after_deletes_leaves_product_absent() {
        let (store, text, _) = setup();
        store.insert(&item("p1")).unwrap();
        text.fail_insert.store(true, Ordering::SeqCst);

        let err = store.upsert(&item("p1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PartialWrite {
                op: WriteOp::Upsert,
                stage: WriteStage::Insert,
                failed: Modality::Text,
                ..
            }
        ));
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 0);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 0);
    }

    #[test]
    fn test_delete_partial_failure() {
        let (store, _, image) = setup();
        store.insert(&item("p1")).unwrap();
        image.fail_delete.store(true, Ordering::SeqCst);

        let err = store.delete("p1").unwrap_err();
        assert_eq!(err.failed_side(), Some(Modality::Image));
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 0);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);

        // Retry just the remaining side
        image.fail_delete.store(false, Ordering::SeqCst);
        assert_eq!(store.index(Modality::Image).delete("p1").unwrap(), 1);
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let (store, _, _) = setup();
        let mut bad = item("p1");
        bad.image_embedding = vec![1.0; 3];

        let err = store.insert(&bad).unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                modality: Modality::Image,
                expected: 2,
                actual: 3
            }
        ));
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 0);
    }

    #[test]
    fn test_non_finite_embedding_fails_fast() {
        let (store, _, _) = setup();
        let mut bad = item("p1");
        bad.image_embedding = vec![f32::NAN, 1.0];

        assert!(matches!(
            store.insert(&bad).unwrap_err(),
            StoreError::InvalidEmbedding {
                modality: Modality::Image,
                ..
            }
        ));

        store.insert(&item("p1")).unwrap();
        bad.image_embedding = vec![1e20, 1e20];
        assert!(matches!(
            store.upsert(&bad).unwrap_err(),
            StoreError::InvalidEmbedding {
                modality: Modality::Image,
                ..
            }
        ));

        // The rejected upsert never reached its deletes
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);
    }

    #[test]
    fn test_upsert_image_delete_failure_is_partial() {
        let (store, _, image) = setup();
        store.insert(&item("p1")).unwrap();
        image.fail_delete.store(true, Ordering::SeqCst);

        let err = store.upsert(&item("p1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::PartialWrite {
                op: WriteOp::Upsert,
                stage: WriteStage::Delete,
                failed: Modality::Image,
                ..
            }
        ));

        // Text rows are already gone and nothing was re-inserted
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 0);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);
        assert!(!store.exists("p1").unwrap());
    }

    #[test]
    fn test_delete_text_failure_changes_nothing() {
        let (store, text, _) = setup();
        store.insert(&item("p1")).unwrap();
        text.fail_delete.store(true, Ordering::SeqCst);

        let err = store.delete("p1").unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexUnavailable {
                modality: Modality::Text,
                ..
            }
        ));
        assert!(!err.is_partial());
        assert_eq!(store.count("p1", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("p1", Modality::Image).unwrap(), 1);
    }
}
