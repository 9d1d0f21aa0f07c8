use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::Metadata;

/// Retrieval-only request against the vector index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub filters: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    #[schema(value_type = Object)]
    pub fields: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub namespace: String,
    pub query: String,
    pub top_k: u32,
    pub hits: Vec<SearchHit>,
}

/// Query parameters for `GET /documents/stats`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct IndexStatsParams {
    /// Only report this namespace. All namespaces when omitted.
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NamespaceStat {
    pub vector_count: u64,
}

/// Record counts per index namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IndexStatsResponse {
    pub namespaces: BTreeMap<String, NamespaceStat>,
}
