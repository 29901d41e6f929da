//! Index mapping types.
//!
//! An [`IndexMapping`] describes the field layout of one entity's documents. Its
//! hash names the physical index, so a changed layout always lands in a new
//! index and a stale live index can be detected by comparing hashes.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Normalizer applied to keyword fields used for case-insensitive filtering.
pub const LOWERCASE_ASCIIFOLDING_NORMALIZER: &str = "lowercase_asciifolding_normalizer";

/// Analyzer used for fuzzy (partial word) matching.
pub const TRIGRAM_ANALYZER: &str = "trigram_analyzer";

/// Analyzer used for free-text fields written in English.
pub const ENGLISH_ANALYZER: &str = "english_analyzer";

/// Number of hex characters kept from the SHA-256 digest.
const MAPPING_HASH_LEN: usize = 32;

/// Layout of a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMapping {
    Keyword {
        normalizer: Option<String>,
    },
    Text {
        analyzer: Option<String>,
        fields: BTreeMap<String, FieldMapping>,
    },
    Date,
    Boolean,
    Integer,
    Long,
    Double,
    Object {
        properties: BTreeMap<String, FieldMapping>,
    },
    Nested {
        properties: BTreeMap<String, FieldMapping>,
    },
}

impl FieldMapping {
    /// Plain keyword field, matched exactly.
    pub fn keyword() -> Self {
        Self::Keyword { normalizer: None }
    }

    /// Keyword field matched case- and accent-insensitively.
    pub fn normalized_keyword() -> Self {
        Self::Keyword {
            normalizer: Some(LOWERCASE_ASCIIFOLDING_NORMALIZER.to_string()),
        }
    }

    /// Text field with the default analyzer.
    pub fn text() -> Self {
        Self::Text {
            analyzer: None,
            fields: BTreeMap::new(),
        }
    }

    /// Text field analyzed as English prose.
    pub fn english_text() -> Self {
        Self::Text {
            analyzer: Some(ENGLISH_ANALYZER.to_string()),
            fields: BTreeMap::new(),
        }
    }

    /// Text field with a `trigram` sub-field for fuzzy matching.
    pub fn trigram_text() -> Self {
        Self::text().with_subfield("trigram", Self::trigram_only())
    }

    /// Text field with a normalized `keyword` sub-field for sorting and exact
    /// matching.
    pub fn sortable_text() -> Self {
        Self::text().with_subfield("keyword", Self::normalized_keyword())
    }

    /// Text field with both `keyword` and `trigram` sub-fields. Used for names.
    pub fn name_text() -> Self {
        Self::sortable_text().with_subfield("trigram", Self::trigram_only())
    }

    fn trigram_only() -> Self {
        Self::Text {
            analyzer: Some(TRIGRAM_ANALYZER.to_string()),
            fields: BTreeMap::new(),
        }
    }

    pub fn date() -> Self {
        Self::Date
    }

    pub fn boolean() -> Self {
        Self::Boolean
    }

    pub fn integer() -> Self {
        Self::Integer
    }

    pub fn long() -> Self {
        Self::Long
    }

    pub fn double() -> Self {
        Self::Double
    }

    /// Object field with the given properties.
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldMapping)>,
        K: Into<String>,
    {
        Self::Object {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Nested field with the given properties.
    pub fn nested<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, FieldMapping)>,
        K: Into<String>,
    {
        Self::Nested {
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Add a sub-field to a text field. Other field types are returned unchanged.
    pub fn with_subfield(mut self, name: impl Into<String>, field: FieldMapping) -> Self {
        if let Self::Text { fields, .. } = &mut self {
            fields.insert(name.into(), field);
        }
        self
    }

    /// Render this field as OpenSearch mapping JSON.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Keyword { normalizer } => {
                let mut field = Map::new();
                field.insert("type".to_string(), json!("keyword"));
                if let Some(normalizer) = normalizer {
                    field.insert("normalizer".to_string(), json!(normalizer));
                }
                Value::Object(field)
            }
            Self::Text { analyzer, fields } => {
                let mut field = Map::new();
                field.insert("type".to_string(), json!("text"));
                if let Some(analyzer) = analyzer {
                    field.insert("analyzer".to_string(), json!(analyzer));
                }
                if !fields.is_empty() {
                    field.insert("fields".to_string(), properties_to_json(fields));
                }
                Value::Object(field)
            }
            Self::Date => json!({"type": "date"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Long => json!({"type": "long"}),
            Self::Double => json!({"type": "double"}),
            Self::Object { properties } => json!({
                "type": "object",
                "properties": properties_to_json(properties),
            }),
            Self::Nested { properties } => json!({
                "type": "nested",
                "properties": properties_to_json(properties),
            }),
        }
    }
}

fn properties_to_json(properties: &BTreeMap<String, FieldMapping>) -> Value {
    Value::Object(
        properties
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect(),
    )
}

/// Field layout of one entity's search documents.
///
/// Dynamic mapping is always disabled: fields not declared here are stored in
/// `_source` but not indexed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexMapping {
    properties: BTreeMap<String, FieldMapping>,
}

impl IndexMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level field.
    pub fn field(mut self, name: impl Into<String>, field: FieldMapping) -> Self {
        self.properties.insert(name.into(), field);
        self
    }

    /// Look up a top-level field.
    pub fn get(&self, name: &str) -> Option<&FieldMapping> {
        self.properties.get(name)
    }

    /// Names of all top-level fields, in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Whether a dotted path (`company.name`) refers to a field inside a
    /// `nested` field, returning the nested path if so.
    pub fn nested_path_of(&self, field_path: &str) -> Option<&str> {
        let (root, _) = field_path.split_once('.')?;
        match self.properties.get_key_value(root)? {
            (name, FieldMapping::Nested { .. }) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Render the mapping as the `mappings` section of an index creation body.
    pub fn to_json(&self) -> Value {
        json!({
            "dynamic": "false",
            "properties": properties_to_json(&self.properties),
        })
    }

    /// Deterministic hash of the field layout.
    ///
    /// The mapping JSON is serialised with object keys in sorted order, hashed
    /// with SHA-256, and truncated to 32 hex characters so it fits comfortably
    /// in an index name.
    pub fn mapping_hash(&self) -> String {
        let canonical = canonical_string(&self.to_json());
        let digest = Sha256::digest(canonical.as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(MAPPING_HASH_LEN);
        hash
    }
}

/// Serialise JSON with object keys sorted at every level.
fn canonical_string(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let body = entries
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_string(v)))
                .collect::<Vec<_>>()
                .join(",");
            format!("{{{}}}", body)
        }
        Value::Array(items) => {
            let body = items
                .iter()
                .map(canonical_string)
                .collect::<Vec<_>>()
                .join(",");
            format!("[{}]", body)
        }
        other => other.to_string(),
    }
}
