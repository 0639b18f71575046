//! Qdrant-backed similarity store speaking the REST API.

use super::types::{ScoredChunk, StoreError, StoredPoint, VectorStore};
use crate::splitter::{Chunk, ChunkMetadata};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

const UPSERT_BATCH_SIZE: usize = 128;

/// Similarity store persisted in a single Qdrant collection.
///
/// `reset` drops and recreates the collection, so every build starts from an empty index.
/// Points are written in batches to stay under Qdrant's request size limit.
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    upsert_batch_size: usize,
}

impl QdrantVectorStore {
    /// Construct a store for `collection` on the Qdrant instance at `url`.
    pub fn new(
        client: Client,
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let base_url = normalize_base_url(url).map_err(StoreError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = %api_key.as_deref().map(|value| !value.is_empty()).unwrap_or(false),
            "Initialized Qdrant vector store"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
            upsert_batch_size: UPSERT_BATCH_SIZE,
        })
    }

    /// Override how many points are sent per upsert request.
    pub fn with_upsert_batch_size(mut self, batch_size: usize) -> Self {
        self.upsert_batch_size = batch_size.max(1);
        self
    }

    /// Collection the store writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn delete_collection(&self) -> Result<(), StoreError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{}", self.collection))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection dropped");
        })
        .await
    }

    async fn create_collection(&self, dimension: usize) -> Result<(), StoreError> {
        let body = json!({
            "vectors": {
                "size": dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, dimension, "Collection created");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn reset(&self, dimension: usize) -> Result<(), StoreError> {
        self.delete_collection().await?;
        self.create_collection(dimension).await
    }

    async fn upsert(&self, points: Vec<StoredPoint>) -> Result<usize, StoreError> {
        if points.is_empty() {
            return Ok(0);
        }

        let indexed_at = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .into_iter()
            .map(|point| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": point.vector,
                    "payload": build_payload(point.chunk, &indexed_at),
                })
            })
            .collect();

        let point_count = serialized.len();
        for batch in serialized.chunks(self.upsert_batch_size) {
            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/points", self.collection),
                )
                .query(&[("wait", true)])
                .json(&json!({ "points": batch }))
                .send()
                .await?;

            self.ensure_success(response, || {
                tracing::debug!(
                    collection = %self.collection,
                    points = batch.len(),
                    "Points batch indexed"
                );
            })
            .await?;
        }
        tracing::debug!(collection = %self.collection, points = point_count, "Points indexed");
        Ok(point_count)
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = json!({
            "query": vector,
            "limit": k,
            "with_payload": true,
        });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        let mut hits = points
            .into_iter()
            .map(|point| {
                let chunk = chunk_from_payload(point.payload.unwrap_or_default())?;
                Ok(ScoredChunk {
                    chunk,
                    score: point.score,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    fn name(&self) -> &'static str {
        "qdrant"
    }
}

fn build_payload(chunk: Chunk, indexed_at: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text));
    payload.insert("metadata".into(), Value::Object(chunk.metadata));
    payload.insert("indexed_at".into(), Value::String(indexed_at.to_string()));
    Value::Object(payload)
}

fn chunk_from_payload(mut payload: Map<String, Value>) -> Result<Chunk, StoreError> {
    let text = match payload.remove("text") {
        Some(Value::String(text)) => text,
        _ => return Err(StoreError::InvalidPayload("payload is missing `text`".into())),
    };
    let metadata = match payload.remove("metadata") {
        Some(Value::Object(metadata)) => metadata,
        _ => ChunkMetadata::new(),
    };
    Ok(Chunk { text, metadata })
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{
        Method::{DELETE, POST, PUT},
        MockServer,
    };

    fn store(server: &MockServer) -> QdrantVectorStore {
        QdrantVectorStore::new(
            Client::builder()
                .user_agent("docqa-test")
                .build()
                .expect("client"),
            &server.base_url(),
            Some("secret".into()),
            "docs",
        )
        .expect("store")
    }

    #[tokio::test]
    async fn reset_drops_and_recreates_collection() {
        let server = MockServer::start_async().await;
        let delete = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/collections/docs")
                    .header("api-key", "secret");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .json_body(json!({ "vectors": { "size": 4, "distance": "Cosine" } }));
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;

        store(&server).reset(4).await.expect("reset");

        delete.assert();
        create.assert();
    }

    #[tokio::test]
    async fn upsert_sends_text_and_metadata_payload() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains(r#""text":"alpha""#)
                    .body_contains(r#""metadata":{"page":2"#);
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let written = store(&server)
            .upsert(vec![StoredPoint {
                vector: vec![0.1, 0.2],
                chunk: Chunk::new("alpha").with_metadata("page", 2),
            }])
            .await
            .expect("upsert");

        mock.assert();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn upsert_splits_points_into_batches() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let points = (0..5)
            .map(|i| StoredPoint {
                vector: vec![i as f32, 1.0],
                chunk: Chunk::new(format!("chunk {i}")),
            })
            .collect();
        let written = store(&server)
            .with_upsert_batch_size(2)
            .upsert(points)
            .await
            .expect("upsert");

        assert_eq!(written, 5);
        mock.assert_hits(3);
    }

    #[tokio::test]
    async fn upsert_stops_at_first_failed_batch() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/docs/points");
                then.status(413).body("payload too large");
            })
            .await;

        let points = (0..4)
            .map(|i| StoredPoint {
                vector: vec![1.0],
                chunk: Chunk::new(format!("chunk {i}")),
            })
            .collect();
        let error = store(&server)
            .with_upsert_batch_size(2)
            .upsert(points)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            StoreError::UnexpectedStatus { status, .. } if status == StatusCode::PAYLOAD_TOO_LARGE
        ));
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn search_decodes_hits_into_chunks() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/query")
                    .json_body_partial(r#"{ "limit": 2, "with_payload": true }"#);
                then.status(200).json_body(json!({
                    "status": "ok",
                    "result": {
                        "points": [
                            {
                                "id": "a",
                                "score": 0.9,
                                "payload": { "text": "best", "metadata": { "page": 1 } }
                            },
                            {
                                "id": "b",
                                "score": 0.4,
                                "payload": { "text": "second", "metadata": { "page": 3 } }
                            }
                        ]
                    }
                }));
            })
            .await;

        let hits = store(&server).search(&[0.5, 0.5], 2).await.expect("search");

        mock.assert();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "best");
        assert_eq!(hits[0].chunk.page(), Some(1));
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[tokio::test]
    async fn search_rejects_payload_without_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/query");
                then.status(200).json_body(json!({
                    "result": [ { "id": 1, "score": 0.3, "payload": {} } ]
                }));
            })
            .await;

        let error = store(&server).search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(error, StoreError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn len_reads_exact_count() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/count");
                then.status(200)
                    .json_body(json!({ "result": { "count": 7 } }));
            })
            .await;

        assert_eq!(store(&server).len().await.expect("len"), 7);
    }

    #[test]
    fn rejects_invalid_url() {
        let result = QdrantVectorStore::new(Client::new(), "not a url", None, "docs");
        assert!(matches!(result, Err(StoreError::InvalidUrl(_))));
    }
}
