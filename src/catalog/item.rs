//! Catalog data model shared by both modality indexes

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key read by the lexical rerank stage
pub const DESCRIPTION_KEY: &str = "description";

/// One of the two embedding spaces an item is indexed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
        }
    }

    /// The opposite modality
    pub fn other(&self) -> Modality {
        match self {
            Modality::Text => Modality::Image,
            Modality::Image => Modality::Text,
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metadata value. Metadata is schema-less: link, image URL,
/// price, title, brand and so on all land here untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Null,
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Number(value)
    }
}

/// Open key/value document attached to every catalog row
pub type Metadata = BTreeMap<String, MetaValue>;

/// The `description` field of a metadata document, or "" when absent or not text
pub fn description_of(metadata: &Metadata) -> &str {
    metadata
        .get(DESCRIPTION_KEY)
        .and_then(MetaValue::as_text)
        .unwrap_or("")
}

/// A product as written to the catalog: one embedding per modality plus the
/// category prefilter and metadata replicated into both indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    pub product_id: String,
    pub text_embedding: Vec<f32>,
    pub image_embedding: Vec<f32>,
    pub category: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CatalogItem {
    pub fn new(
        product_id: impl Into<String>,
        text_embedding: Vec<f32>,
        image_embedding: Vec<f32>,
        category: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            text_embedding,
            image_embedding,
            category: category.into(),
            metadata,
        }
    }

    /// Embedding for the given modality
    pub fn embedding(&self, modality: Modality) -> &[f32] {
        match modality {
            Modality::Text => &self.text_embedding,
            Modality::Image => &self.image_embedding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_json_shape() {
        let json = r#"{"title":"Linen shirt","price":49.5,"brand":null}"#;
        let metadata: Metadata = serde_json::from_str(json).unwrap();

        assert_eq!(metadata["title"], MetaValue::Text("Linen shirt".to_string()));
        assert_eq!(metadata["price"], MetaValue::Number(49.5));
        assert_eq!(metadata["brand"], MetaValue::Null);
    }

    #[test]
    fn test_description_of() {
        let mut metadata = Metadata::new();
        assert_eq!(description_of(&metadata), "");

        metadata.insert(DESCRIPTION_KEY.to_string(), MetaValue::Number(3.0));
        assert_eq!(description_of(&metadata), "");

        metadata.insert(DESCRIPTION_KEY.to_string(), "Blue denim jacket".into());
        assert_eq!(description_of(&metadata), "Blue denim jacket");
    }

    #[test]
    fn test_modality_other() {
        assert_eq!(Modality::Text.other(), Modality::Image);
        assert_eq!(Modality::Image.to_string(), "image");
    }
}
