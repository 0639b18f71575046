//! HTTP surface for docqa.
//!
//! - `GET /` returns a welcome string.
//! - `POST /` answers `{ "query": string | string[], "url"?: string }`. Without `url` the preloaded
//!   document is used; with `url` a throwaway system is built for that document. The response is
//!   one `{ "question", "answer" }` object or an array of them in query order.
//! - `GET /metrics` returns ingestion and answering counters.

use crate::error::{ErrorKind, QaError};
use crate::metrics::MetricsSnapshot;
use crate::qa::{QaApi, QaOutput, QueryInput};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Body returned by `GET /`.
pub const WELCOME_MESSAGE: &str = "Welcome to the docqa API";

/// Build the HTTP router exposing the QA API surface.
///
/// Browser clients on any origin may call the API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: QaApi + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(welcome).post(answer_query::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
        .layer(cors)
}

async fn welcome() -> Json<&'static str> {
    Json(WELCOME_MESSAGE)
}

/// Request body for `POST /`.
#[derive(Deserialize)]
struct QueryRequest {
    /// One question or a list of questions.
    query: QueryInput,
    /// Optional document URL overriding the preloaded document.
    #[serde(default)]
    url: Option<String>,
}

async fn answer_query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QaOutput>, AppError>
where
    S: QaApi,
{
    let QueryRequest { query, url } = request;
    let output = match url.as_deref().map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            tracing::info!(url, "Answering against requested document");
            service.answer_from_source(url, query).await?
        }
        None => service.answer(query).await?,
    };
    Ok(Json(output))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: QaApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(QaError);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Format | ErrorKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<QaError> for AppError {
    fn from(inner: QaError) -> Self {
        Self(inner)
    }
}
