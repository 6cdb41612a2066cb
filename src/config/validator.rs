use crate::config::Config;
use crate::error::{LookbookError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_rerank(config, &mut errors);
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LookbookError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.persist && config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty when persistence is enabled",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let index = &config.index;

        let backend = index.backend.as_str();
        if backend != "hnsw" && backend != "flat" {
            errors.push(ValidationError::new(
                "index.backend",
                format!("Backend must be 'hnsw' or 'flat', got '{}'", backend),
            ));
        }

        if index.text_collection.is_empty() || index.image_collection.is_empty() {
            errors.push(ValidationError::new(
                "index.text_collection",
                "Collection names cannot be empty",
            ));
        } else if index.text_collection == index.image_collection {
            errors.push(ValidationError::new(
                "index.image_collection",
                "Text and image collections must be distinct",
            ));
        }

        if index.text_dim == 0 {
            errors.push(ValidationError::new(
                "index.text_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if index.image_dim == 0 {
            errors.push(ValidationError::new(
                "index.image_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if index.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if index.hnsw_ef_construction == 0 || index.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw_ef_search",
                "HNSW ef parameters must be greater than 0",
            ));
        }

        let ratio = index.hnsw_rebuild_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            errors.push(ValidationError::new(
                "index.hnsw_rebuild_ratio",
                format!("Rebuild ratio must be finite and positive, got {}", ratio),
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        for (path, weight) in [
            ("search.text_weight", search.text_weight),
            ("search.image_weight", search.image_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be finite and non-negative, got {}", weight),
                ));
            }
        }

        for (path, threshold) in [
            ("search.text_threshold", search.text_threshold),
            ("search.image_threshold", search.image_threshold),
            ("search.hybrid_text_threshold", search.hybrid_text_threshold),
            ("search.hybrid_image_threshold", search.hybrid_image_threshold),
        ] {
            if !(-1.0..=1.0).contains(&threshold) {
                errors.push(ValidationError::new(
                    path,
                    format!("Threshold must be between -1.0 and 1.0, got {}", threshold),
                ));
            }
        }

        if search.min_results == 0 {
            errors.push(ValidationError::new(
                "search.min_results",
                "Result floor must be greater than 0",
            ));
        }

        if search.oversample_factor == 0 {
            errors.push(ValidationError::new(
                "search.oversample_factor",
                "Oversample factor must be greater than 0",
            ));
        }
    }

    fn validate_rerank(config: &Config, errors: &mut Vec<ValidationError>) {
        let rerank = &config.rerank;
        if !(rerank.vector_weight >= 0.0 && rerank.lexical_weight >= 0.0) {
            errors.push(ValidationError::new(
                "rerank.vector_weight",
                "Rerank weights must be non-negative",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.ingest.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "ingest.max_concurrent",
                "Concurrency must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_backend() {
        let mut config = Config::default();
        config.index.backend = "ivf".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_invalid_rebuild_ratio() {
        let mut config = Config::default();
        config.index.hnsw_rebuild_ratio = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());

        config.index.hnsw_rebuild_ratio = f32::NAN;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_negative_weight() {
        let mut config = Config::default();
        config.search.image_weight = -0.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut config = Config::default();
        config.index.text_dim = 0;
        config.search.min_results = 0;
        config.ingest.max_concurrent = 0;

        match ConfigValidator::validate(&config) {
            Err(LookbookError::ConfigValidation { errors }) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_same_collection_names() {
        let mut config = Config::default();
        config.index.image_collection = config.index.text_collection.clone();
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
