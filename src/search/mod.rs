//! Elasticsearch client and query builders

mod client;
mod query;
mod response;

pub use client::{SearchClient, SearchConfig};
pub use query::{MultiSearchQuery, QueryBody, SearchQuery};
pub use response::{
    MultiSearchItemResponse, MultiSearchResponse, SearchHitResponse, SearchHitsResponse,
    SearchHitsTotalRelation, SearchHitsTotalResponse, SearchResponse,
};
