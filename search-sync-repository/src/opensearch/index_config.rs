//! OpenSearch index settings.
//!
//! Every index is created with the same sharding and analysis settings; only the
//! mapping differs between entities and between mapping generations.

use search_sync_shared::IndexMapping;
use serde_json::{json, Map, Value};

/// Sharding configuration applied to new indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 1,
        }
    }
}

impl IndexSettings {
    /// Create index settings.
    ///
    /// # Arguments
    ///
    /// * `number_of_shards` - Primary shards per index
    /// * `number_of_replicas` - Replicas per primary shard
    pub fn new(number_of_shards: u32, number_of_replicas: u32) -> Self {
        Self {
            number_of_shards,
            number_of_replicas,
        }
    }
}

/// Analyzers, tokenizers and normalizers referenced by entity mappings.
///
/// - **trigram_analyzer**: 3-gram tokens over letters and digits for fuzzy
///   name/postcode matching, with hyphens stripped first
/// - **english_analyzer**: stemming and stop words for prose fields
/// - **lowercase_asciifolding_normalizer**: case and accent insensitive
///   keywords
pub fn analysis_settings() -> Value {
    json!({
        "analyzer": {
            "trigram_analyzer": {
                "type": "custom",
                "tokenizer": "trigram",
                "char_filter": ["special_chars"],
                "filter": ["lowercase"]
            },
            "english_analyzer": {
                "type": "custom",
                "tokenizer": "standard",
                "filter": [
                    "english_possessive_stemmer",
                    "lowercase",
                    "english_stop",
                    "english_stemmer"
                ]
            }
        },
        "tokenizer": {
            "trigram": {
                "type": "ngram",
                "min_gram": 3,
                "max_gram": 3,
                "token_chars": ["letter", "digit"]
            }
        },
        "char_filter": {
            "special_chars": {
                "type": "mapping",
                "mappings": ["-=>"]
            }
        },
        "filter": {
            "english_possessive_stemmer": {
                "type": "stemmer",
                "language": "possessive_english"
            },
            "english_stop": {
                "type": "stop",
                "stopwords": "_english_"
            },
            "english_stemmer": {
                "type": "stemmer",
                "language": "english"
            }
        },
        "normalizer": {
            "lowercase_asciifolding_normalizer": {
                "type": "custom",
                "filter": ["lowercase", "asciifolding"]
            }
        }
    })
}

/// Build the request body for creating an index.
///
/// # Arguments
///
/// * `mapping` - The entity mapping
/// * `aliases` - Aliases to attach at creation time
/// * `settings` - Sharding configuration
pub fn index_creation_body(
    mapping: &IndexMapping,
    aliases: &[String],
    settings: &IndexSettings,
) -> Value {
    let aliases: Map<String, Value> = aliases
        .iter()
        .map(|alias| (alias.clone(), json!({})))
        .collect();

    json!({
        "settings": {
            "number_of_shards": settings.number_of_shards,
            "number_of_replicas": settings.number_of_replicas,
            "analysis": analysis_settings()
        },
        "aliases": aliases,
        "mappings": mapping.to_json()
    })
}
