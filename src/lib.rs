//! Lookbook - Dual-Modality Clothing Catalog
//!
//! Keeps a text-embedding index and an image-embedding index of the same
//! catalog consistent by product id, and answers queries by fusing cosine
//! similarity from both spaces, backfilling text-only matches up to a result
//! floor, and optionally reranking on description keywords.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod ingest;
pub mod retrieval;
pub mod storage;

pub use error::{LookbookError, Result};
