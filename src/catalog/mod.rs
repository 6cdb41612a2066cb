//! Catalog: the dual store and the fusion searcher over one pair of indexes
//!
//! [`Catalog`] is the lifecycle handle. It opens both collections from
//! configuration (persisted or in-memory), hands out the store for writes and
//! the searcher for reads, and is closed explicitly when the caller is done.

mod item;
mod store;

pub use item::{description_of, CatalogItem, MetaValue, Metadata, Modality, DESCRIPTION_KEY};
pub use store::{DeleteReport, DualStore, StoreError, WriteOp, WriteReceipt, WriteStage};

use crate::config::Config;
use crate::error::{LookbookError, Result};
use crate::index::{FlatIndex, HnswIndex, HnswParams, VectorIndex};
use crate::retrieval::{
    FusedMatch, FusionConfig, FusionQuery, FusionSearcher, LexicalReranker, SearchError,
};
use crate::storage::{Database, StorageManager, StorageStats};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Open catalog: both indexes, the store writing to them, the searcher reading them
pub struct Catalog {
    store: Arc<DualStore>,
    searcher: FusionSearcher,
    storage: Option<StorageManager>,
    backend: String,
}

/// Row counts per collection plus on-disk usage when persisted
#[derive(Debug)]
pub struct CatalogStats {
    pub backend: String,
    pub text_rows: usize,
    pub image_rows: usize,
    pub storage: Option<StorageStats>,
}

impl Catalog {
    /// Open the catalog described by `config`
    pub fn open(config: &Config) -> Result<Self> {
        if config.storage.persist {
            Self::open_at(config.data_dir()?, config)
        } else {
            Self::in_memory(config)
        }
    }

    /// Open a persisted catalog rooted at `data_dir`
    pub fn open_at(data_dir: PathBuf, config: &Config) -> Result<Self> {
        info!("Opening catalog at {}", data_dir.display());
        let storage = StorageManager::new(data_dir)?;
        let database = Arc::new(storage.database.clone());
        Self::build(config, Some(database), Some(storage))
    }

    /// Catalog that lives only as long as the process
    pub fn in_memory(config: &Config) -> Result<Self> {
        info!("Opening in-memory catalog");
        Self::build(config, None, None)
    }

    fn build(
        config: &Config,
        database: Option<Arc<Database>>,
        storage: Option<StorageManager>,
    ) -> Result<Self> {
        let index = &config.index;
        let text_index = Self::open_index(
            config,
            &index.text_collection,
            index.text_dim,
            database.clone(),
        )?;
        let image_index =
            Self::open_index(config, &index.image_collection, index.image_dim, database)?;

        let fusion = FusionConfig::from_settings(&config.search).map_err(SearchError::from)?;
        let reranker =
            LexicalReranker::new(config.rerank.vector_weight, config.rerank.lexical_weight);

        let store = Arc::new(DualStore::new(text_index, image_index));
        let searcher = FusionSearcher::for_store(&store, fusion, reranker);

        info!(
            "Catalog ready: backend={}, {} text rows, {} image rows",
            index.backend,
            store.index(Modality::Text).len(),
            store.index(Modality::Image).len()
        );

        Ok(Self {
            store,
            searcher,
            storage,
            backend: index.backend.clone(),
        })
    }

    fn open_index(
        config: &Config,
        name: &str,
        dimension: usize,
        database: Option<Arc<Database>>,
    ) -> Result<Arc<dyn VectorIndex>> {
        let index: Arc<dyn VectorIndex> = match config.index.backend.as_str() {
            "flat" => match database {
                Some(db) => Arc::new(FlatIndex::open(name, dimension, db)?),
                None => Arc::new(FlatIndex::new(name, dimension)),
            },
            "hnsw" => {
                let params = HnswParams {
                    dimension,
                    m: config.index.hnsw_m,
                    ef_construction: config.index.hnsw_ef_construction,
                    ef_search: config.index.hnsw_ef_search,
                    max_elements: config.index.max_elements,
                    rebuild_ratio: config.index.hnsw_rebuild_ratio,
                };
                match database {
                    Some(db) => Arc::new(HnswIndex::open(name, params, db)?),
                    None => Arc::new(HnswIndex::new(name, params)),
                }
            }
            other => {
                return Err(LookbookError::Config(format!(
                    "Unknown index backend: {}",
                    other
                )))
            }
        };
        Ok(index)
    }

    pub fn store(&self) -> &Arc<DualStore> {
        &self.store
    }

    pub fn searcher(&self) -> &FusionSearcher {
        &self.searcher
    }

    pub fn is_persistent(&self) -> bool {
        self.storage.is_some()
    }

    /// Run a fusion search
    pub async fn search(&self, query: &FusionQuery) -> Result<Vec<FusedMatch>> {
        Ok(self.searcher.search(query).await?)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let storage = match &self.storage {
            Some(storage) => Some(storage.stats()?),
            None => None,
        };

        Ok(CatalogStats {
            backend: self.backend.clone(),
            text_rows: self.store.index(Modality::Text).len(),
            image_rows: self.store.index(Modality::Image).len(),
            storage,
        })
    }

    /// Flush persisted state and release both indexes
    pub fn close(self) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.database.checkpoint()?;
        }
        info!("Catalog closed");
        Ok(())
    }
}
