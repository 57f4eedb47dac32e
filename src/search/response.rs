//! Response documents returned by the search engine

use serde::Deserialize;
use serde_json::Value;

/// Body of a `_search` response. Only the parts this crate reads are typed.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    pub hits: SearchHitsResponse,
}

#[derive(Debug, Deserialize)]
pub struct SearchHitsResponse {
    pub total: Option<SearchHitsTotalResponse>,
    pub hits: Vec<SearchHitResponse>,
}

/// `hits.total` is an object on current engines and a bare count when
/// `rest_total_hits_as_int` is set or on 6.x clusters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SearchHitsTotalResponse {
    Count(u64),
    Object {
        value: u64,
        relation: SearchHitsTotalRelation,
    },
}

impl SearchHitsTotalResponse {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(value) | Self::Object { value, .. } => *value,
        }
    }

    /// A bare count is always exact.
    pub fn relation(&self) -> SearchHitsTotalRelation {
        match self {
            Self::Count(_) => SearchHitsTotalRelation::Eq,
            Self::Object { relation, .. } => *relation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SearchHitsTotalRelation {
    #[serde(rename = "eq")]
    Eq,
    #[serde(rename = "gte")]
    Gte,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct SearchHitResponse {
    #[serde(rename = "_index", default)]
    pub index: String,

    #[serde(rename = "_id")]
    pub id: Option<String>,

    #[serde(rename = "_score")]
    pub score: Option<f64>,

    #[serde(rename = "_source")]
    pub source: Option<Value>,
}

impl SearchHitsResponse {
    /// Matched document bodies in hit order. Hits without a source map to `null`.
    pub fn into_sources(self) -> Vec<Value> {
        self.hits
            .into_iter()
            .map(|hit| hit.source.unwrap_or(Value::Null))
            .collect()
    }
}

/// Body of an `_msearch` response: one entry per submitted query.
#[derive(Debug, Deserialize)]
pub struct MultiSearchResponse {
    pub responses: Vec<MultiSearchItemResponse>,
}

/// A single `_msearch` entry, which carries either hits or an error.
#[derive(Debug, Deserialize)]
pub struct MultiSearchItemResponse {
    pub status: Option<u16>,
    pub error: Option<Value>,
    pub hits: Option<SearchHitsResponse>,
}
