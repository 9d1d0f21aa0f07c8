use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::Metadata;

/// Fixed-length digest of a canonical request description.
///
/// Two requests that differ only in field order, map iteration order,
/// surrounding whitespace or query casing produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn builder(kind: &'static str) -> KeyBuilder {
        KeyBuilder {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Key for a full chat answer. Only valid for requests without history.
    pub fn for_chat(
        namespace: &str,
        query: &str,
        top_k: u32,
        min_score: f64,
        use_web_fallback: bool,
        max_web_results: u32,
    ) -> Self {
        Self::builder("chat")
            .text("namespace", namespace)
            .text("query", &normalize_query(query))
            .field("top_k", top_k)
            .field("min_score", min_score)
            .field("use_web_fallback", use_web_fallback)
            .field("max_web_results", max_web_results)
            .build()
    }

    /// Key for a retrieval-only search.
    pub fn for_search(
        namespace: &str,
        query: &str,
        top_k: u32,
        filters: Option<&Metadata>,
    ) -> Self {
        Self::builder("search")
            .text("namespace", namespace)
            .text("query", &normalize_query(query))
            .field("top_k", top_k)
            .filters("filters", filters)
            .build()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collects named key components; names are emitted in sorted order.
pub struct KeyBuilder {
    kind: &'static str,
    fields: BTreeMap<&'static str, String>,
}

impl KeyBuilder {
    /// Free text, quoted so separators inside it cannot collide.
    pub fn text(mut self, name: &'static str, value: &str) -> Self {
        self.fields.insert(name, canonical_json(&Value::String(value.to_string())));
        self
    }

    pub fn field(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.fields.insert(name, value.to_string());
        self
    }

    /// An optional filter map. Absent and empty are treated alike.
    pub fn filters(mut self, name: &'static str, filters: Option<&Metadata>) -> Self {
        let rendered = match filters {
            Some(map) if !map.is_empty() => {
                canonical_json(&Value::Object(map.clone().into_iter().collect()))
            }
            _ => "{}".to_string(),
        };
        self.fields.insert(name, rendered);
        self
    }

    pub fn build(self) -> CacheKey {
        let mut canonical = String::from(self.kind);
        for (name, value) in &self.fields {
            canonical.push('|');
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(value);
        }

        let digest = Sha256::digest(canonical.as_bytes());
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        CacheKey(hex)
    }
}

/// Trim, collapse internal whitespace and lowercase.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Serialize a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Metadata {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn query_normalization_collapses_whitespace_and_case() {
        assert_eq!(normalize_query("  What   is\tRAG \n"), "what is rag");
    }

    #[test]
    fn equivalent_chat_requests_share_a_key() {
        let a = CacheKey::for_chat("dev", "What is RAG", 5, 0.25, true, 5);
        let b = CacheKey::for_chat("dev", "  what  is rag", 5, 0.25, true, 5);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn every_chat_parameter_affects_the_key() {
        let base = CacheKey::for_chat("dev", "q", 5, 0.25, true, 5);
        assert_ne!(base, CacheKey::for_chat("prod", "q", 5, 0.25, true, 5));
        assert_ne!(base, CacheKey::for_chat("dev", "q2", 5, 0.25, true, 5));
        assert_ne!(base, CacheKey::for_chat("dev", "q", 6, 0.25, true, 5));
        assert_ne!(base, CacheKey::for_chat("dev", "q", 5, 0.3, true, 5));
        assert_ne!(base, CacheKey::for_chat("dev", "q", 5, 0.25, false, 5));
        assert_ne!(base, CacheKey::for_chat("dev", "q", 5, 0.25, true, 3));
    }

    #[test]
    fn filter_order_does_not_matter() {
        let a = metadata(json!({"year": 2020, "tags": {"b": 1, "a": [2, 1]}}));
        let mut b = Metadata::new();
        b.insert("tags".into(), json!({"a": [2, 1], "b": 1}));
        b.insert("year".into(), json!(2020));

        assert_eq!(
            CacheKey::for_search("dev", "q", 5, Some(&a)),
            CacheKey::for_search("dev", "q", 5, Some(&b))
        );
    }

    #[test]
    fn array_order_is_significant() {
        let a = metadata(json!({"ids": [1, 2]}));
        let b = metadata(json!({"ids": [2, 1]}));
        assert_ne!(
            CacheKey::for_search("dev", "q", 5, Some(&a)),
            CacheKey::for_search("dev", "q", 5, Some(&b))
        );
    }

    #[test]
    fn empty_filters_match_absent_filters() {
        let empty = Metadata::new();
        assert_eq!(
            CacheKey::for_search("dev", "q", 5, None),
            CacheKey::for_search("dev", "q", 5, Some(&empty))
        );
    }

    #[test]
    fn search_and_chat_keys_never_collide() {
        assert_ne!(
            CacheKey::for_search("dev", "q", 5, None),
            CacheKey::for_chat("dev", "q", 5, 0.25, true, 5)
        );
    }

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({"z": 1, "a": {"y": true, "b": null}});
        assert_eq!(canonical_json(&value), r#"{"a":{"b":null,"y":true},"z":1}"#);
    }
}
