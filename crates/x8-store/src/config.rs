//! Memory provider configuration.
//!
//! Provides [`MemoryConfig`] for configuring the in-memory document store.
//! Field-name settings accept either one name for every collection or a
//! per-collection map, see [`FieldMapping`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Document field name, shared by all collections or chosen per collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMapping {
    /// The same field in every collection.
    Single(String),
    /// Collection name to field name.
    PerCollection(BTreeMap<String, String>),
}

impl FieldMapping {
    /// The field name for `collection`.
    #[must_use]
    pub fn for_collection(&self, collection: &str) -> Option<&str> {
        match self {
            Self::Single(field) => Some(field),
            Self::PerCollection(fields) => fields.get(collection).map(String::as_str),
        }
    }

    /// Parse `field` or `collection=field,collection=field`.
    ///
    /// Returns `None` for an empty string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if !value.contains('=') {
            return Some(Self::Single(value.to_owned()));
        }
        let fields = value
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(collection, field)| (collection.trim().to_owned(), field.trim().to_owned()))
            .filter(|(collection, field)| !collection.is_empty() && !field.is_empty())
            .collect();
        Some(Self::PerCollection(fields))
    }
}

impl From<&str> for FieldMapping {
    fn from(field: &str) -> Self {
        Self::Single(field.to_owned())
    }
}

/// Memory provider configuration.
///
/// # Examples
///
/// ```
/// use x8_store::config::MemoryConfig;
///
/// let config = MemoryConfig::default();
/// assert_eq!(config.id_field("docs"), Some("id"));
/// assert_eq!(config.etag_field("docs"), Some("_etag"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Collection used when an operation names none.
    #[builder(default, setter(into, strip_option))]
    pub collection: Option<String>,

    /// Document field holding the id.
    #[builder(default = Some(FieldMapping::from("id")))]
    pub id_map_field: Option<FieldMapping>,

    /// Document field holding the partition key.
    #[builder(default = Some(FieldMapping::from("pk")))]
    pub pk_map_field: Option<FieldMapping>,

    /// Document field storing the generated etag.
    #[builder(default = Some(FieldMapping::from("_etag")))]
    pub etag_embed_field: Option<FieldMapping>,

    /// Top-level fields stripped from returned documents.
    #[builder(default)]
    pub suppress_fields: Vec<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            collection: None,
            id_map_field: Some(FieldMapping::from("id")),
            pk_map_field: Some(FieldMapping::from("pk")),
            etag_embed_field: Some(FieldMapping::from("_etag")),
            suppress_fields: Vec::new(),
        }
    }
}

impl MemoryConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `X8_MEMORY_COLLECTION` | unset |
    /// | `X8_MEMORY_ID_FIELD` | `id` |
    /// | `X8_MEMORY_PK_FIELD` | `pk` |
    /// | `X8_MEMORY_ETAG_FIELD` | `_etag` |
    /// | `X8_MEMORY_SUPPRESS_FIELDS` | empty |
    ///
    /// Field variables take `field` or `collection=field,...`; an empty value
    /// disables the mapping.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("X8_MEMORY_COLLECTION") {
            if !v.is_empty() {
                config.collection = Some(v);
            }
        }
        if let Ok(v) = std::env::var("X8_MEMORY_ID_FIELD") {
            config.id_map_field = FieldMapping::parse(&v);
        }
        if let Ok(v) = std::env::var("X8_MEMORY_PK_FIELD") {
            config.pk_map_field = FieldMapping::parse(&v);
        }
        if let Ok(v) = std::env::var("X8_MEMORY_ETAG_FIELD") {
            config.etag_embed_field = FieldMapping::parse(&v);
        }
        if let Ok(v) = std::env::var("X8_MEMORY_SUPPRESS_FIELDS") {
            config.suppress_fields = parse_list(&v);
        }

        config
    }

    /// Id field for `collection`.
    #[must_use]
    pub fn id_field(&self, collection: &str) -> Option<&str> {
        self.id_map_field.as_ref()?.for_collection(collection)
    }

    /// Partition key field for `collection`.
    #[must_use]
    pub fn pk_field(&self, collection: &str) -> Option<&str> {
        self.pk_map_field.as_ref()?.for_collection(collection)
    }

    /// Etag field for `collection`.
    #[must_use]
    pub fn etag_field(&self, collection: &str) -> Option<&str> {
        self.etag_embed_field.as_ref()?.for_collection(collection)
    }
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_create_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.collection, None);
        assert_eq!(config.id_field("any"), Some("id"));
        assert_eq!(config.pk_field("any"), Some("pk"));
        assert_eq!(config.etag_field("any"), Some("_etag"));
        assert!(config.suppress_fields.is_empty());
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = MemoryConfig::builder()
            .collection("docs")
            .id_map_field(Some(FieldMapping::from("key")))
            .pk_map_field(None)
            .suppress_fields(vec!["_etag".to_owned()])
            .build();
        assert_eq!(config.collection.as_deref(), Some("docs"));
        assert_eq!(config.id_field("docs"), Some("key"));
        assert_eq!(config.pk_field("docs"), None);
        assert_eq!(config.etag_field("docs"), Some("_etag"));
        assert_eq!(config.suppress_fields, vec!["_etag"]);
    }

    #[test]
    fn test_should_resolve_per_collection_fields() {
        let mapping = FieldMapping::parse("users=uid, orders=oid").unwrap();
        assert_eq!(mapping.for_collection("users"), Some("uid"));
        assert_eq!(mapping.for_collection("orders"), Some("oid"));
        assert_eq!(mapping.for_collection("other"), None);
        assert_eq!(FieldMapping::parse("id"), Some(FieldMapping::from("id")));
        assert_eq!(FieldMapping::parse("  "), None);
    }

    #[test]
    fn test_should_deserialize_either_mapping_form() {
        let config: MemoryConfig = serde_json::from_str(
            r#"{"idMapField": "id", "pkMapField": {"docs": "tenant"}, "etagEmbedField": null}"#,
        )
        .unwrap();
        assert_eq!(config.id_field("docs"), Some("id"));
        assert_eq!(config.pk_field("docs"), Some("tenant"));
        assert_eq!(config.etag_field("docs"), None);
    }

    #[test]
    fn test_should_parse_list_values() {
        assert_eq!(parse_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_should_load_from_env() {
        let config = MemoryConfig::from_env();
        assert!(config.collection.as_deref() != Some(""));
    }
}
