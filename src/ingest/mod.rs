//! Catalog ingestion
//!
//! Loads pre-embedded product rows from JSON Lines and writes them into the
//! dual store with bounded concurrency. A failed row never aborts the run;
//! every outcome is tallied in [`IngestStats`].

use crate::catalog::{
    CatalogItem, DualStore, MetaValue, Metadata, Modality, StoreError, DESCRIPTION_KEY,
};
use crate::error::{LookbookError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One product row as it arrives from the embedding job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_id: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    pub text_embedding: Vec<f32>,
    pub image_embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ProductRecord {
    /// Catalog item with `description` folded into the metadata
    pub fn into_item(self) -> CatalogItem {
        let mut metadata = self.metadata;
        if let Some(description) = self.description {
            metadata.insert(DESCRIPTION_KEY.to_string(), MetaValue::Text(description));
        }
        CatalogItem::new(
            self.product_id,
            self.text_embedding,
            self.image_embedding,
            self.category,
            metadata,
        )
    }
}

/// How rows that may already exist are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestMode {
    /// Check the text index first and insert only unseen products
    SkipExisting,
    /// Replace any existing rows
    Replace,
}

/// A product left with only one side written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub product_id: String,
    pub failed: Modality,
}

/// Result of an ingestion run
#[derive(Debug, Default, Serialize)]
pub struct IngestStats {
    pub inserted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub partial: Vec<PartialFailure>,
    pub duration_ms: u64,
}

impl IngestStats {
    pub fn total(&self) -> usize {
        self.inserted + self.skipped + self.failed + self.partial.len()
    }
}

#[derive(Debug)]
enum Outcome {
    Inserted,
    Skipped,
    Failed,
    Partial(PartialFailure),
}

/// Writes product rows into a [`DualStore`]
pub struct IngestPipeline {
    store: Arc<DualStore>,
    mode: IngestMode,
    max_concurrent: usize,
}

impl IngestPipeline {
    pub fn new(store: Arc<DualStore>, mode: IngestMode, max_concurrent: usize) -> Self {
        Self {
            store,
            mode,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Ingest every record, at most `max_concurrent` writes in flight
    pub async fn run(&self, records: Vec<ProductRecord>) -> Result<IngestStats> {
        let start = std::time::Instant::now();
        info!(
            "Starting ingestion of {} records ({:?}, concurrency {})",
            records.len(),
            self.mode,
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for record in records {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| LookbookError::Other(e.into()))?;
            let store = Arc::clone(&self.store);
            let mode = self.mode;

            tasks.spawn_blocking(move || {
                let _permit = permit;
                write_one(&store, mode, record.into_item())
            });
        }

        let mut stats = IngestStats::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Inserted) => stats.inserted += 1,
                Ok(Outcome::Skipped) => stats.skipped += 1,
                Ok(Outcome::Failed) => stats.failed += 1,
                Ok(Outcome::Partial(partial)) => stats.partial.push(partial),
                Err(e) => {
                    warn!("Ingest task failed: {}", e);
                    stats.failed += 1;
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Ingestion complete: {} inserted, {} skipped, {} failed, {} partial, {}ms",
            stats.inserted,
            stats.skipped,
            stats.failed,
            stats.partial.len(),
            stats.duration_ms
        );

        Ok(stats)
    }
}

fn write_one(store: &DualStore, mode: IngestMode, item: CatalogItem) -> Outcome {
    let result = match mode {
        IngestMode::Replace => store.upsert(&item),
        IngestMode::SkipExisting => {
            match store.exists(&item.product_id) {
                Ok(true) => {
                    debug!("Skipping existing product {}", item.product_id);
                    return Outcome::Skipped;
                }
                Ok(false) => {}
                // Dedup is best-effort; an unreadable index does not block the write
                Err(e) => warn!(
                    "Exists check failed for {}, inserting anyway: {}",
                    item.product_id, e
                ),
            }
            store.insert(&item)
        }
    };

    match result {
        Ok(_) => Outcome::Inserted,
        Err(StoreError::PartialWrite { failed, .. }) => {
            warn!(
                "Partial write for {}: {} side needs a retry",
                item.product_id, failed
            );
            Outcome::Partial(PartialFailure {
                product_id: item.product_id,
                failed,
            })
        }
        Err(e) => {
            warn!("Failed to ingest {}: {}", item.product_id, e);
            Outcome::Failed
        }
    }
}

/// Read JSON Lines product records, skipping blank lines
pub fn load_jsonl(path: &Path) -> Result<Vec<ProductRecord>> {
    let content = std::fs::read_to_string(path).map_err(|e| LookbookError::Io {
        source: e,
        context: format!("Failed to read records file: {}", path.display()),
    })?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| LookbookError::Json {
                source: e,
                context: format!("{} line {}", path.display(), number + 1),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FlatIndex;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(id: &str) -> ProductRecord {
        ProductRecord {
            product_id: id.to_string(),
            category: "dress".to_string(),
            description: Some(format!("{id} midi dress")),
            text_embedding: vec![1.0, 0.0],
            image_embedding: vec![0.0, 1.0],
            metadata: Metadata::new(),
        }
    }

    fn store() -> Arc<DualStore> {
        Arc::new(DualStore::new(
            Arc::new(FlatIndex::new("text", 2)),
            Arc::new(FlatIndex::new("image", 2)),
        ))
    }

    #[tokio::test]
    async fn test_skip_existing() {
        let store = store();
        let pipeline = IngestPipeline::new(Arc::clone(&store), IngestMode::SkipExisting, 2);

        let stats = pipeline.run(vec![record("a"), record("b")]).await.unwrap();
        assert_eq!(stats.inserted, 2);

        let stats = pipeline.run(vec![record("a"), record("c")]).await.unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.count("a", Modality::Text).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_is_idempotent() {
        let store = store();
        let pipeline = IngestPipeline::new(Arc::clone(&store), IngestMode::Replace, 4);

        pipeline.run(vec![record("a")]).await.unwrap();
        let stats = pipeline.run(vec![record("a")]).await.unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(store.count("a", Modality::Text).unwrap(), 1);
        assert_eq!(store.count("a", Modality::Image).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bad_row_does_not_abort_run() {
        let store = store();
        let pipeline = IngestPipeline::new(store, IngestMode::Replace, 2);

        let mut bad = record("bad");
        bad.image_embedding = vec![1.0, 0.0, 0.0];

        let stats = pipeline.run(vec![record("a"), bad, record("b")]).await.unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total(), 3);
    }

    #[test]
    fn test_description_folds_into_metadata() {
        let item = record("a").into_item();
        assert_eq!(crate::catalog::description_of(&item.metadata), "a midi dress");
    }

    #[test]
    fn test_load_jsonl() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"product_id":"a","category":"dress","text_embedding":[1.0,0.0],"image_embedding":[0.0,1.0]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"product_id":"b","category":"shirt","description":"linen","text_embedding":[1.0,0.0],"image_embedding":[0.0,1.0],"metadata":{{"price":19.5}}}}"#
        )
        .unwrap();

        let records = load_jsonl(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].description.as_deref(), Some("linen"));
        assert_eq!(records[1].metadata.get("price"), Some(&MetaValue::Number(19.5)));
    }

    #[test]
    fn test_load_jsonl_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{not json").unwrap();

        match load_jsonl(file.path()) {
            Err(LookbookError::Json { context, .. }) => assert!(context.ends_with("line 1")),
            other => panic!("expected json error, got {:?}", other.map(|r| r.len())),
        }
    }
}
