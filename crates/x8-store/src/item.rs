//! Key, etag, and field-name handling for stored documents.
//!
//! [`ItemProcessor`] knows which document fields carry the id, partition
//! key, and etag of a collection. It derives keys from documents, stamps
//! those fields into documents on write, and resolves the logical `$id`,
//! `$pk`, `$etag` and `$score` names used in expressions.

use std::borrow::Cow;
use std::collections::BTreeSet;

use serde_json::{Map, Value};
use typed_builder::TypedBuilder;
use x8_model::error::X8Error;
use x8_model::types::{Item, Key, Properties};
use x8_ql::{FieldResolver, Update};

/// Logical id field.
pub const ID_FIELD: &str = "$id";
/// Logical partition key field.
pub const PK_FIELD: &str = "$pk";
/// Logical etag field.
pub const ETAG_FIELD: &str = "$etag";
/// Logical relevance score field.
pub const SCORE_FIELD: &str = "$score";

/// Canonical `(pk, id)` identity used as an internal map key.
///
/// Components hold the compact JSON text of the key values so `"1"` and `1`
/// stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedKey {
    /// Partition key, if the collection uses one.
    pub pk: Option<String>,
    /// Document id.
    pub id: String,
}

impl NormalizedKey {
    fn new(id: &Value, pk: Option<&Value>) -> Self {
        Self {
            pk: pk.map(Value::to_string),
            id: id.to_string(),
        }
    }
}

/// Maps between documents, keys, and etags for one collection.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use x8_store::item::ItemProcessor;
///
/// let processor = ItemProcessor::builder()
///     .id_map_field("id")
///     .etag_embed_field("_etag")
///     .local_etag(true)
///     .build();
/// let doc = processor.add_embed_fields(json!({"id": "1"}), None).unwrap();
/// assert!(processor.get_etag_from_value(&doc).is_some());
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ItemProcessor {
    /// Field the id is always written to.
    #[builder(default, setter(into, strip_option))]
    pub id_embed_field: Option<String>,
    /// Field the partition key is always written to.
    #[builder(default, setter(into, strip_option))]
    pub pk_embed_field: Option<String>,
    /// Field storing the etag.
    #[builder(default, setter(into, strip_option))]
    pub etag_embed_field: Option<String>,
    /// Document field read as the id.
    #[builder(default, setter(into, strip_option))]
    pub id_map_field: Option<String>,
    /// Document field read as the partition key.
    #[builder(default, setter(into, strip_option))]
    pub pk_map_field: Option<String>,
    /// Field `$score` resolves to.
    #[builder(default, setter(into, strip_option))]
    pub score_resolve_field: Option<String>,
    /// Whether etags are generated here rather than by the backend.
    #[builder(default)]
    pub local_etag: bool,
    /// Top-level fields stripped from returned documents.
    #[builder(default)]
    pub suppress_fields: Vec<String>,
}

impl ItemProcessor {
    // -- Keys --

    /// The id carried by `key`.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn get_id_from_key<'k>(&self, key: &'k Key) -> Option<&'k Value> {
        Some(&key.id).filter(|id| !id.is_null())
    }

    /// The partition key carried by `key`.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn get_pk_from_key<'k>(&self, key: &'k Key) -> Option<&'k Value> {
        key.pk.as_ref().filter(|pk| !pk.is_null())
    }

    /// The id stored in `value`.
    #[must_use]
    pub fn get_id_from_value<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        lookup(value, self.id_embed_field.as_deref())
            .or_else(|| lookup(value, self.id_map_field.as_deref()))
    }

    /// The partition key stored in `value`.
    #[must_use]
    pub fn get_pk_from_value<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        lookup(value, self.pk_embed_field.as_deref())
            .or_else(|| lookup(value, self.pk_map_field.as_deref()))
    }

    /// The key of a stored document.
    pub fn get_key_from_value(&self, value: &Value) -> Result<Key, X8Error> {
        let id = self
            .get_id_from_value(value)
            .ok_or_else(|| X8Error::bad_request("Document id missing"))?;
        Ok(Key {
            id: id.clone(),
            pk: self.get_pk_from_value(value).cloned(),
        })
    }

    /// Canonical identity of `key`.
    pub fn get_normalized_key_from_key(&self, key: &Key) -> Result<NormalizedKey, X8Error> {
        let id = self
            .get_id_from_key(key)
            .ok_or_else(|| X8Error::bad_request("Key id missing"))?;
        Ok(NormalizedKey::new(id, self.get_pk_from_key(key)))
    }

    /// Canonical identity of a stored document.
    pub fn get_normalized_key_from_value(&self, value: &Value) -> Result<NormalizedKey, X8Error> {
        let id = self
            .get_id_from_value(value)
            .ok_or_else(|| X8Error::bad_request("Document id missing"))?;
        Ok(NormalizedKey::new(id, self.get_pk_from_value(value)))
    }

    /// A document holding only the key fields of `key`.
    #[must_use]
    pub fn get_value_from_key(&self, key: &Key) -> Value {
        let mut document = Map::new();
        if let Some(id) = self.get_id_from_key(key) {
            if let Some(field) = self.id_embed_field.as_ref().or(self.id_map_field.as_ref()) {
                document.insert(field.clone(), id.clone());
            }
        }
        if let Some(pk) = self.get_pk_from_key(key) {
            if let Some(field) = self.pk_embed_field.as_ref().or(self.pk_map_field.as_ref()) {
                document.insert(field.clone(), pk.clone());
            }
        }
        Value::Object(document)
    }

    // -- Writes --

    /// Stamp key and etag fields into a document about to be stored.
    ///
    /// With a key, embed fields always take the key values and map fields are
    /// filled only where the document lacks them. Without a key, embed fields
    /// are copied from the map fields. A fresh etag is written when etags are
    /// local.
    pub fn add_embed_fields(&self, value: Value, key: Option<&Key>) -> Result<Value, X8Error> {
        let Value::Object(mut document) = value else {
            return Err(X8Error::bad_request("Document must be an object"));
        };

        if let Some(key) = key {
            let id = self.get_id_from_key(key).cloned().unwrap_or(Value::Null);
            let pk = self.get_pk_from_key(key).cloned().unwrap_or(Value::Null);
            if let Some(field) = &self.id_embed_field {
                document.insert(field.clone(), id.clone());
            }
            if let Some(field) = &self.pk_embed_field {
                if self.id_embed_field.as_ref() != Some(field) {
                    document.insert(field.clone(), pk.clone());
                }
            }
            if let Some(field) = &self.id_map_field {
                document.entry(field.clone()).or_insert(id);
            }
            if let Some(field) = &self.pk_map_field {
                if key.pk.is_some() {
                    document.entry(field.clone()).or_insert(pk);
                }
            }
        } else {
            if let (Some(embed), Some(map)) = (&self.id_embed_field, &self.id_map_field) {
                if let Some(id) = document.get(map).cloned() {
                    document.insert(embed.clone(), id);
                }
            }
            if let (Some(embed), Some(map)) = (&self.pk_embed_field, &self.pk_map_field) {
                if self.id_embed_field.as_ref() != Some(embed) {
                    if let Some(pk) = document.get(map).cloned() {
                        document.insert(embed.clone(), pk);
                    }
                }
            }
        }

        if self.needs_local_etag() {
            if let Some(field) = &self.etag_embed_field {
                document.insert(field.clone(), Value::String(Self::generate_etag()));
            }
        }
        Ok(Value::Object(document))
    }

    // -- Etags --

    /// The etag stored in `value`.
    #[must_use]
    pub fn get_etag_from_value<'v>(&self, value: &'v Value) -> Option<&'v str> {
        lookup(value, self.etag_embed_field.as_deref())?.as_str()
    }

    /// A new opaque etag.
    #[must_use]
    pub fn generate_etag() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Whether etags are generated and stored in documents here.
    #[must_use]
    pub fn needs_local_etag(&self) -> bool {
        self.local_etag && self.etag_embed_field.is_some()
    }

    /// Append a `put` of the etag field so the update also advances the version.
    #[must_use]
    pub fn add_etag_update(&self, update: Update, etag: &str) -> Update {
        match &self.etag_embed_field {
            Some(field) if self.local_etag => update.put(field.clone(), etag),
            _ => update,
        }
    }

    // -- Results --

    /// Remove suppressed top-level fields, keeping those named in `except`.
    #[must_use]
    pub fn suppress_fields(&self, value: &Value, except: &BTreeSet<String>) -> Value {
        match value {
            Value::Object(document) if !self.suppress_fields.is_empty() => Value::Object(
                document
                    .iter()
                    .filter(|(k, _)| except.contains(*k) || !self.suppress_fields.contains(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Build the caller-facing item for a stored document.
    #[must_use]
    pub fn build_item_from_value(&self, value: &Value, include_value: bool) -> Item {
        self.build_item(value, include_value, &BTreeSet::new())
    }

    /// Build the item for a projected query result. Explicitly selected
    /// fields survive suppression.
    #[must_use]
    pub fn build_selected_item(&self, value: &Value, selected: &BTreeSet<String>) -> Item {
        self.build_item(value, true, selected)
    }

    fn build_item(&self, value: &Value, include_value: bool, selected: &BTreeSet<String>) -> Item {
        let properties = self.get_etag_from_value(value).map(|etag| Properties {
            etag: Some(etag.to_owned()),
            last_modified: None,
        });
        Item {
            key: Key {
                id: self.get_id_from_value(value).cloned().unwrap_or(Value::Null),
                pk: self.get_pk_from_value(value).cloned(),
            },
            value: include_value.then(|| self.suppress_fields(value, selected)),
            metadata: None,
            properties,
        }
    }
}

impl FieldResolver for ItemProcessor {
    fn resolve_field<'a>(&self, field: &'a str) -> Cow<'a, str> {
        let resolved = match field {
            ID_FIELD => self.id_map_field.as_ref().or(self.id_embed_field.as_ref()),
            PK_FIELD => self.pk_map_field.as_ref().or(self.pk_embed_field.as_ref()),
            ETAG_FIELD => self.etag_embed_field.as_ref(),
            SCORE_FIELD => self.score_resolve_field.as_ref(),
            _ => None,
        };
        match resolved {
            Some(name) => Cow::Owned(name.clone()),
            None => Cow::Borrowed(field),
        }
    }
}

fn lookup<'v>(value: &'v Value, field: Option<&str>) -> Option<&'v Value> {
    value.get(field?).filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn processor() -> ItemProcessor {
        ItemProcessor::builder()
            .id_map_field("id")
            .pk_map_field("pk")
            .etag_embed_field("_etag")
            .local_etag(true)
            .build()
    }

    #[test]
    fn test_should_resolve_logical_fields() {
        let p = processor();
        assert_eq!(p.resolve_field("$id"), "id");
        assert_eq!(p.resolve_field("$pk"), "pk");
        assert_eq!(p.resolve_field("$etag"), "_etag");
        assert_eq!(p.resolve_field("$score"), "$score");
        assert_eq!(p.resolve_field("obj.nstr"), "obj.nstr");
    }

    #[test]
    fn test_should_stamp_key_and_etag() {
        let p = processor();
        let doc = p
            .add_embed_fields(json!({"x": 1}), Some(&Key::with_pk("7", "pk01")))
            .unwrap();
        assert_eq!(doc["id"], json!("7"));
        assert_eq!(doc["pk"], json!("pk01"));
        assert!(doc["_etag"].is_string());
    }

    #[test]
    fn test_should_keep_document_key_over_explicit_key() {
        let p = processor();
        let doc = p
            .add_embed_fields(json!({"id": "1"}), Some(&Key::new("2")))
            .unwrap();
        assert_eq!(doc["id"], json!("1"));
    }

    #[test]
    fn test_should_regenerate_etag_on_every_write() {
        let p = processor();
        let first = p.add_embed_fields(json!({"id": "1"}), None).unwrap();
        let second = p.add_embed_fields(first.clone(), None).unwrap();
        assert_ne!(p.get_etag_from_value(&first), p.get_etag_from_value(&second));
    }

    #[test]
    fn test_should_reject_non_object_document() {
        let err = processor().add_embed_fields(json!([1]), None).unwrap_err();
        assert_eq!(err.code, x8_model::X8ErrorCode::BadRequest);
    }

    #[test]
    fn test_should_normalize_keys_from_key_and_value() {
        let p = processor();
        let from_key = p
            .get_normalized_key_from_key(&Key::with_pk("1", "pk00"))
            .unwrap();
        let from_value = p
            .get_normalized_key_from_value(&json!({"id": "1", "pk": "pk00", "x": 2}))
            .unwrap();
        assert_eq!(from_key, from_value);
        let numeric = p.get_normalized_key_from_key(&Key::new(1)).unwrap();
        assert_ne!(numeric, p.get_normalized_key_from_key(&Key::new("1")).unwrap());
    }

    #[test]
    fn test_should_fail_without_id() {
        let err = processor()
            .get_normalized_key_from_value(&json!({"pk": "pk00"}))
            .unwrap_err();
        assert_eq!(err.code, x8_model::X8ErrorCode::BadRequest);
    }

    #[test]
    fn test_should_append_etag_update() {
        let update = processor().add_etag_update(Update::new().put("a", 1), "e1");
        assert_eq!(update.operations.len(), 2);
        assert_eq!(update.operations[1].field, "_etag");
        assert_eq!(update.operations[1].args, vec![json!("e1")]);
        let plain = ItemProcessor::default().add_etag_update(Update::new(), "e1");
        assert!(plain.is_empty());
    }

    #[test]
    fn test_should_build_item_with_suppressed_fields() {
        let p = ItemProcessor {
            suppress_fields: vec!["_etag".to_owned()],
            ..processor()
        };
        let item = p.build_item_from_value(&json!({"id": "1", "pk": "a", "_etag": "e"}), true);
        assert_eq!(item.key, Key::with_pk("1", "a"));
        assert_eq!(item.etag(), Some("e"));
        assert_eq!(item.value, Some(json!({"id": "1", "pk": "a"})));
        assert!(p.build_item_from_value(&json!({"id": "1"}), false).value.is_none());
    }

    #[test]
    fn test_should_keep_selected_suppressed_fields() {
        let p = ItemProcessor {
            suppress_fields: vec!["_etag".to_owned(), "secret".to_owned()],
            ..processor()
        };
        let selected = BTreeSet::from(["id".to_owned(), "_etag".to_owned()]);
        let item = p.build_selected_item(&json!({"id": "1", "_etag": "e", "secret": 1}), &selected);
        assert_eq!(item.value, Some(json!({"id": "1", "_etag": "e"})));
    }

    #[test]
    fn test_should_build_value_from_key() {
        let doc = processor().get_value_from_key(&Key::with_pk("3", "pk02"));
        assert_eq!(doc, json!({"id": "3", "pk": "pk02"}));
    }
}
