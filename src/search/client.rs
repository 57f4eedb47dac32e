//! HTTP client for the search engine's document, search and index APIs

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use super::query::{MultiSearchQuery, QueryBody};
use super::response::{MultiSearchResponse, SearchResponse};
use crate::env::{get_env_int, get_env_string};
use crate::error::{CommonError, Result};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`SearchClient`]
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub host: String,
    pub port: String,
    /// Per-request timeout, covering connect, send and body read
    pub timeout: Duration,
}

impl SearchConfig {
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Read `ELASTICSEARCH_HOST`, `ELASTICSEARCH_PORT` and `ELASTICSEARCH_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let timeout_secs = get_env_int("ELASTICSEARCH_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS as i64);
        Self {
            host: get_env_string("ELASTICSEARCH_HOST", "localhost"),
            port: get_env_string("ELASTICSEARCH_PORT", "9200"),
            timeout: Duration::from_secs(timeout_secs as u64),
        }
    }

    fn base_url(&self) -> Result<Url> {
        if self.host.is_empty() || self.port.is_empty() {
            return Err(CommonError::ConfigError(
                "search engine host and port are required".into(),
            ));
        }
        Ok(Url::parse(&format!("http://{}:{}/", self.host, self.port))?)
    }
}

/// Thin client over the search engine REST API.
///
/// Every operation is a future; dropping it aborts the in-flight request.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    base_url: Url,
}

impl SearchClient {
    pub fn new(config: SearchConfig) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                CommonError::ConfigError(format!("error creating search client: {}", e))
            })?;

        debug!(url = %base_url, "Search client created");
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Index one document into `index`.
    pub async fn index_document<T>(&self, index: &str, document: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        require_index(index)?;
        let body = serde_json::to_vec(document)?;

        let response = self
            .client
            .post(self.endpoint(&[index, "_doc"])?)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check_status(response, "indexing document").await?;

        debug!(index = index, "Document indexed");
        Ok(())
    }

    /// Run a search and return the matched document bodies in hit order.
    ///
    /// An empty `index` searches across all indices.
    pub async fn search_documents(&self, index: &str, query: &QueryBody) -> Result<Vec<Value>> {
        let response = self
            .client
            .post(self.endpoint(&[index, "_search"])?)
            .json(query)
            .send()
            .await?;
        let response = check_status(response, "searching documents").await?;
        let result: SearchResponse = parse_body(response).await?;

        debug!(
            index = index,
            took_ms = result.took,
            hits = result.hits.hits.len(),
            "Search completed"
        );
        Ok(result.hits.into_sources())
    }

    /// Submit a batch of queries in one `_msearch` round trip.
    ///
    /// Returns one result list per query, in submission order. Fails as a
    /// whole if any entry in the response carries an error.
    pub async fn multi_search(
        &self,
        default_index: &str,
        queries: &MultiSearchQuery,
    ) -> Result<Vec<Vec<Value>>> {
        let body = queries.build_body(default_index)?;

        let response = self
            .client
            .post(self.endpoint(&[default_index, "_msearch"])?)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;
        let response = check_status(response, "executing multi-search").await?;
        let result: MultiSearchResponse = parse_body(response).await?;

        if result.responses.len() != queries.len() {
            return Err(CommonError::SearchError(format!(
                "error parsing response: expected {} multi-search responses, got {}",
                queries.len(),
                result.responses.len()
            )));
        }

        let mut documents = Vec::with_capacity(result.responses.len());
        for (position, item) in result.responses.into_iter().enumerate() {
            if let Some(err) = item.error {
                error!(
                    position = position,
                    status = ?item.status,
                    error = %err,
                    "Multi-search query failed"
                );
                return Err(CommonError::SearchError(format!(
                    "error executing multi-search query {}: {}",
                    position, err
                )));
            }
            let hits = item.hits.ok_or_else(|| {
                CommonError::SearchError(format!(
                    "error parsing response: multi-search entry {} has no hits",
                    position
                ))
            })?;
            documents.push(hits.into_sources());
        }

        debug!(default_index = default_index, queries = documents.len(), "Multi-search completed");
        Ok(documents)
    }

    /// Delete `index` and all of its documents.
    pub async fn delete_index(&self, index: &str) -> Result<()> {
        require_index(index)?;

        let response = self.client.delete(self.endpoint(&[index])?).send().await?;
        check_status(response, "deleting index").await?;

        debug!(index = index, "Index deleted");
        Ok(())
    }

    /// Append non-empty `segments` to the base URL verbatim, so index names
    /// such as `remote:products` are never read as a scheme.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CommonError::ConfigError(format!("invalid search engine url: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments.iter().filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}

fn require_index(index: &str) -> Result<()> {
    if index.is_empty() {
        return Err(CommonError::InvalidQuery("index name cannot be empty".into()));
    }
    Ok(())
}

/// Turn a non-2xx response into an error carrying the status and body text.
async fn check_status(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => format!("<body unavailable: {}>", e),
    };
    Err(CommonError::SearchError(format!(
        "error {}: [{}] {}",
        action, status, text
    )))
}

async fn parse_body<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CommonError::SearchError(format!("error parsing response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchQuery;
    use axum::extract::State;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use axum::Router;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct RecordedRequest {
        method: Method,
        path: String,
        content_type: Option<String>,
        body: String,
    }

    /// In-process stand-in for the search engine that replays one canned response.
    #[derive(Clone)]
    struct MockSearchEngine {
        status: StatusCode,
        body: Arc<String>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockSearchEngine {
        fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().clone()
        }
    }

    async fn record(
        State(engine): State<MockSearchEngine>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        engine.requests.lock().push(RecordedRequest {
            method,
            path: uri.path().to_string(),
            content_type: headers
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body,
        });
        (engine.status, engine.body.as_str().to_string())
    }

    async fn spawn_engine(status: StatusCode, body: Value) -> (SearchClient, MockSearchEngine) {
        let engine = MockSearchEngine {
            status,
            body: Arc::new(body.to_string()),
            requests: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new().fallback(record).with_state(engine.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = SearchClient::new(SearchConfig::new("127.0.0.1", port.to_string())).unwrap();
        (client, engine)
    }

    fn body(value: Value) -> QueryBody {
        value.as_object().cloned().unwrap()
    }

    fn hits(sources: &[Value]) -> Value {
        let hits: Vec<Value> = sources
            .iter()
            .enumerate()
            .map(|(i, source)| {
                json!({ "_index": "products", "_id": i.to_string(), "_source": source })
            })
            .collect();
        json!({ "hits": { "total": { "value": hits.len(), "relation": "eq" }, "hits": hits } })
    }

    #[test]
    fn test_new_requires_host_and_port() {
        assert!(SearchClient::new(SearchConfig::new("", "9200")).is_err());
        assert!(SearchClient::new(SearchConfig::new("localhost", "")).is_err());

        let client = SearchClient::new(SearchConfig::new("localhost", "10200")).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:10200/");
    }

    #[test]
    fn test_config_from_env() {
        crate::env::with_env_vars(
            &[
                ("ELASTICSEARCH_HOST", Some("es.internal")),
                ("ELASTICSEARCH_PORT", None),
                ("ELASTICSEARCH_TIMEOUT_SECS", Some("5")),
            ],
            || {
                let config = SearchConfig::from_env();
                assert_eq!(config.host, "es.internal");
                assert_eq!(config.port, "9200");
                assert_eq!(config.timeout, Duration::from_secs(5));
            },
        );
    }

    #[tokio::test]
    async fn test_index_document() {
        let (client, engine) =
            spawn_engine(StatusCode::CREATED, json!({ "result": "created" })).await;

        let doc = json!({ "title": "Test Document", "content": "This is a test document" });
        client.index_document("test-index", &doc).await.unwrap();

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].path, "/test-index/_doc");
        assert_eq!(requests[0].content_type.as_deref(), Some("application/json"));
        assert_eq!(serde_json::from_str::<Value>(&requests[0].body).unwrap(), doc);
    }

    #[tokio::test]
    async fn test_index_document_empty_index() {
        let (client, engine) = spawn_engine(StatusCode::CREATED, json!({})).await;

        let result = client.index_document("", &json!({ "test": "data" })).await;
        assert!(matches!(result, Err(CommonError::InvalidQuery(_))));
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_index_document_error_status() {
        let (client, _engine) = spawn_engine(
            StatusCode::BAD_REQUEST,
            json!({ "error": { "type": "mapper_parsing_exception" } }),
        )
        .await;

        let err = client
            .index_document("test-index", &json!({ "test": "data" }))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("400"), "{}", message);
        assert!(message.contains("mapper_parsing_exception"), "{}", message);
    }

    #[tokio::test]
    async fn test_search_documents() {
        let sources = [json!({ "title": "Test Search Document" }), json!({ "title": "Other" })];
        let (client, engine) = spawn_engine(StatusCode::OK, hits(&sources)).await;

        let query = body(json!({ "query": { "match": { "title": "Test" } } }));
        let docs = client.search_documents("test-search-index", &query).await.unwrap();
        assert_eq!(docs, sources.to_vec());

        let requests = engine.requests();
        assert_eq!(requests[0].path, "/test-search-index/_search");
        assert_eq!(
            serde_json::from_str::<Value>(&requests[0].body).unwrap(),
            Value::Object(query)
        );
    }

    #[tokio::test]
    async fn test_search_documents_all_indices() {
        let (client, engine) = spawn_engine(StatusCode::OK, hits(&[])).await;

        let query = body(json!({ "query": { "match_all": {} } }));
        let docs = client.search_documents("", &query).await.unwrap();
        assert!(docs.is_empty());
        assert_eq!(engine.requests()[0].path, "/_search");
    }

    #[tokio::test]
    async fn test_search_documents_cross_cluster_index() {
        let (client, engine) = spawn_engine(StatusCode::OK, hits(&[json!({ "a": 1 })])).await;

        let query = body(json!({ "query": { "match_all": {} } }));
        let docs = client.search_documents("remote:products", &query).await.unwrap();
        assert_eq!(docs, vec![json!({ "a": 1 })]);

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/remote:products/_search");
    }

    #[tokio::test]
    async fn test_index_paths_with_colon() {
        let (client, engine) = spawn_engine(StatusCode::OK, json!({ "acknowledged": true })).await;

        client.index_document("logs:2024", &json!({ "a": 1 })).await.unwrap();
        client.delete_index("logs:2024").await.unwrap();

        let paths: Vec<String> = engine.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/logs:2024/_doc", "/logs:2024"]);
    }

    #[tokio::test]
    async fn test_search_documents_integer_total() {
        let (client, _engine) = spawn_engine(
            StatusCode::OK,
            json!({
                "took": 1,
                "hits": { "total": 1, "hits": [{ "_index": "p", "_source": { "a": 1 } }] }
            }),
        )
        .await;

        let query = body(json!({ "query": { "match_all": {} } }));
        let docs = client.search_documents("p", &query).await.unwrap();
        assert_eq!(docs, vec![json!({ "a": 1 })]);
    }

    #[tokio::test]
    async fn test_error_status_with_unreadable_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // Promise more body than is sent, then hang up.
            let _ = socket
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
                .await;
            let _ = socket.shutdown().await;
        });

        let client = SearchClient::new(SearchConfig::new("127.0.0.1", port.to_string())).unwrap();
        let err = client.delete_index("test-index").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500"), "{}", message);
        assert!(message.contains("<body unavailable:"), "{}", message);
    }

    #[tokio::test]
    async fn test_search_documents_missing_index() {
        let (client, _engine) = spawn_engine(
            StatusCode::NOT_FOUND,
            json!({ "error": { "type": "index_not_found_exception" }, "status": 404 }),
        )
        .await;

        let query = body(json!({ "query": { "match_all": {} } }));
        let result = client.search_documents("empty-index", &query).await;
        assert!(matches!(result, Err(CommonError::SearchError(_))));
    }

    #[tokio::test]
    async fn test_search_documents_malformed_response() {
        let (client, _engine) = spawn_engine(StatusCode::OK, json!({ "unexpected": true })).await;

        let query = body(json!({ "query": { "match_all": {} } }));
        let err = client.search_documents("products", &query).await.unwrap_err();
        assert!(err.to_string().contains("error parsing response"));
    }

    #[tokio::test]
    async fn test_multi_search() {
        let (client, engine) = spawn_engine(
            StatusCode::OK,
            json!({
                "took": 4,
                "responses": [
                    hits(&[json!({ "t": "a" })]),
                    hits(&[json!({ "t": "b" }), json!({ "t": "bb" })]),
                ]
            }),
        )
        .await;

        let mut mquery = MultiSearchQuery::new();
        let first = body(json!({ "match": { "t": "a" } }));
        let second = body(json!({ "match": { "t": "b" } }));
        mquery.add_query(SearchQuery::new("idx1", Some(first)).ok());
        mquery.add_query(SearchQuery::new("idx2", Some(second)).ok());

        let results = client.multi_search("idx3", &mquery).await.unwrap();
        assert_eq!(
            results,
            vec![
                vec![json!({ "t": "a" })],
                vec![json!({ "t": "b" }), json!({ "t": "bb" })]
            ]
        );

        let requests = engine.requests();
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].path, "/idx3/_msearch");
        assert_eq!(requests[0].content_type.as_deref(), Some(NDJSON_CONTENT_TYPE));
        assert_eq!(
            requests[0].body,
            "{\"index\":\"idx1\"}\n{\"match\":{\"t\":\"a\"}}\n\
             {\"index\":\"idx2\"}\n{\"match\":{\"t\":\"b\"}}\n"
        );
    }

    #[tokio::test]
    async fn test_multi_search_cross_cluster_default_index() {
        let (client, engine) =
            spawn_engine(StatusCode::OK, json!({ "responses": [hits(&[])] })).await;

        let mquery: MultiSearchQuery =
            [SearchQuery::new("remote:products", Some(QueryBody::new())).unwrap()]
                .into_iter()
                .collect();
        client.multi_search("remote:products", &mquery).await.unwrap();

        let requests = engine.requests();
        assert_eq!(requests[0].path, "/remote:products/_msearch");
        assert_eq!(requests[0].body, "{ }\n{}\n");
    }

    #[tokio::test]
    async fn test_multi_search_entry_error_fails_batch() {
        let (client, _engine) = spawn_engine(
            StatusCode::OK,
            json!({
                "responses": [
                    hits(&[json!({ "t": "a" })]),
                    { "status": 404, "error": { "type": "index_not_found_exception" } }
                ]
            }),
        )
        .await;

        let mquery: MultiSearchQuery = [
            SearchQuery::new("products", None).unwrap(),
            SearchQuery::new("missing", None).unwrap(),
        ]
        .into_iter()
        .collect();

        let err = client.multi_search("products", &mquery).await.unwrap_err();
        assert!(err.to_string().contains("index_not_found_exception"));
    }

    #[tokio::test]
    async fn test_multi_search_response_count_mismatch() {
        let (client, _engine) =
            spawn_engine(StatusCode::OK, json!({ "responses": [hits(&[])] })).await;

        let mquery: MultiSearchQuery = [
            SearchQuery::new("products", None).unwrap(),
            SearchQuery::new("stores", None).unwrap(),
        ]
        .into_iter()
        .collect();

        assert!(client.multi_search("products", &mquery).await.is_err());
    }

    #[tokio::test]
    async fn test_multi_search_empty_batch_sends_nothing() {
        let (client, engine) = spawn_engine(StatusCode::OK, json!({ "responses": [] })).await;

        let result = client.multi_search("products", &MultiSearchQuery::new()).await;
        assert!(matches!(result, Err(CommonError::InvalidQuery(_))));
        assert!(engine.requests().is_empty());
    }

    #[tokio::test]
    async fn test_delete_index() {
        let (client, engine) = spawn_engine(StatusCode::OK, json!({ "acknowledged": true })).await;

        client.delete_index("test-index").await.unwrap();
        assert!(client.delete_index("").await.is_err());

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].path, "/test-index");
    }

    #[tokio::test]
    async fn test_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = SearchClient::new(SearchConfig::new("127.0.0.1", port.to_string())).unwrap();
        let result = client.delete_index("test-index").await;
        assert!(matches!(result, Err(CommonError::SearchError(_))));
    }
}
