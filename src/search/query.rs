//! Single and batched search queries, framed for the `_msearch` endpoint

use serde_json::{Map, Value};

use crate::error::{CommonError, Result};

/// A query body as sent to the search engine.
pub type QueryBody = Map<String, Value>;

/// Header line written when a query targets the batch-level default index.
const SAME_INDEX_HEADER: &[u8] = b"{ }";

/// One search request: a target index and its query body.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    index: String,
    body: Option<QueryBody>,
}

impl SearchQuery {
    /// Create a query against `index`.
    ///
    /// A `None` body is serialised as `null`.
    pub fn new(index: impl Into<String>, body: Option<QueryBody>) -> Result<Self> {
        let index = index.into();
        if index.is_empty() {
            return Err(CommonError::InvalidQuery("index name cannot be empty".into()));
        }
        Ok(Self { index, body })
    }

    /// Create a query from a raw JSON string, which must hold a JSON object.
    pub fn from_json_str(index: impl Into<String>, query: &str) -> Result<Self> {
        let index = index.into();
        if index.is_empty() {
            return Err(CommonError::InvalidQuery("index name cannot be empty".into()));
        }
        let body: QueryBody = serde_json::from_str(query)?;
        Ok(Self {
            index,
            body: Some(body),
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn body(&self) -> Option<&QueryBody> {
        self.body.as_ref()
    }

    /// Append this query's header and body lines to a multi-search buffer.
    ///
    /// The header is `{ }` when the query targets `default_index`, and
    /// `{"index":"<name>"}` otherwise. Nothing is written on error.
    pub fn append_to(&self, default_index: &str, buffer: &mut Vec<u8>) -> Result<()> {
        if default_index.is_empty() {
            return Err(CommonError::InvalidQuery("index name cannot be empty".into()));
        }
        if self.index.is_empty() {
            return Err(CommonError::InvalidQuery("index name cannot be empty".into()));
        }

        let body = serde_json::to_vec(&self.body)?;

        if self.index == default_index {
            buffer.extend_from_slice(SAME_INDEX_HEADER);
        } else {
            serde_json::to_writer(&mut *buffer, &IndexHeader { index: &self.index })?;
        }
        buffer.push(b'\n');

        buffer.extend_from_slice(&body);
        buffer.push(b'\n');

        Ok(())
    }
}

#[derive(serde::Serialize)]
struct IndexHeader<'a> {
    index: &'a str,
}

/// An ordered batch of queries submitted in one `_msearch` round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiSearchQuery {
    queries: Vec<SearchQuery>,
}

impl MultiSearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query. Absent queries are ignored.
    pub fn add_query(&mut self, query: impl Into<Option<SearchQuery>>) {
        if let Some(query) = query.into() {
            self.queries.push(query);
        }
    }

    pub fn queries(&self) -> &[SearchQuery] {
        &self.queries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Build the newline-delimited request body for `default_index`.
    ///
    /// Fails on an empty batch, or on the first query that cannot be framed.
    pub fn build_body(&self, default_index: &str) -> Result<Vec<u8>> {
        if self.queries.is_empty() {
            return Err(CommonError::InvalidQuery(
                "no queries to create multi-search buffer".into(),
            ));
        }

        let mut buffer = Vec::new();
        for query in &self.queries {
            query.append_to(default_index, &mut buffer)?;
        }

        Ok(buffer)
    }

    /// Render the request body as a string, for logging and inspection.
    pub fn to_ndjson_string(&self, default_index: &str) -> Result<String> {
        let body = self.build_body(default_index)?;
        String::from_utf8(body).map_err(|e| CommonError::InvalidQuery(e.to_string()))
    }
}

impl FromIterator<SearchQuery> for MultiSearchQuery {
    fn from_iter<I: IntoIterator<Item = SearchQuery>>(iter: I) -> Self {
        Self {
            queries: iter.into_iter().collect(),
        }
    }
}
