//! HTTP API Server
//!
//! Object reads and writes against the cache, plus leader and status queries.

use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::cache::CacheServer;
use crate::config::ApiConfig;
use crate::election::{ElectionStatus, LeaderElection, RingElection};
use crate::error::{Error, Result};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// Election of this node
    pub election: Arc<RingElection>,
    /// Cache served by this node
    pub cache: Arc<CacheServer>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(
        config: ApiConfig,
        node_id: String,
        election: Arc<RingElection>,
        cache: Arc<CacheServer>,
    ) -> Self {
        let state = Arc::new(AppState {
            node_id,
            election,
            cache,
        });

        Self { config, state }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        Router::new()
            // Objects
            .route(
                "/cache/*key",
                get(handle_get_object)
                    .put(handle_put_object)
                    .delete(handle_delete_object),
            )
            // Status and info
            .route("/leader", get(handle_leader))
            .route("/status", get(handle_status))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.state))
    }

    /// Start the HTTP server
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Response Types ============

/// Write response
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteResponse {
    pub success: bool,
    pub key: String,
}

/// Leader response
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderResponse {
    pub location: String,
    pub endpoint: String,
    pub is_self: bool,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub election: ElectionStatus,
    pub cached_objects: usize,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub node_id: String,
    pub is_leader: bool,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(error: Error) -> Response {
    let (status, code) = match &error {
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        Error::Unsupported(_) => (StatusCode::NOT_IMPLEMENTED, "UNSUPPORTED"),
        Error::TransactionFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TRANSACTION_FAILED"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.cache.get_content(&key).await {
        Ok(content) if content.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(content) => (StatusCode::OK, content).into_response(),
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!("GET {} failed: {}", key, e);
            }
            error_response(e)
        }
    }
}

async fn handle_put_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    body: Bytes,
) -> Response {
    match state.cache.put_content(&key, body).await {
        Ok(()) => Json(WriteResponse { success: true, key }).into_response(),
        Err(e) => {
            tracing::warn!("PUT {} failed: {}", key, e);
            error_response(e)
        }
    }
}

async fn handle_delete_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Response {
    match state.cache.delete_content(&key).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_leader(State(state): State<Arc<AppState>>) -> Response {
    match state.election.get_leader().await {
        Ok(leader) => Json(LeaderResponse {
            is_self: &leader == state.election.local(),
            location: leader.location().to_string(),
            endpoint: leader.endpoint().to_string(),
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        election: state.election.snapshot().await,
        cached_objects: state.cache.len().await,
    })
}

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let is_leader = state.election.current_leader().as_ref() == Some(state.election.local());

    Json(HealthResponse {
        healthy: true,
        node_id: state.node_id.clone(),
        is_leader,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StaticMembership;
    use crate::coordinator::LocalCoordinator;
    use crate::election::{ElectionConfig, ElectionDriver};
    use crate::testing::{addr, ManualTimers, MemoryStore, RecordingTransport};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// Router of a lone node, which always leads
    async fn app(store: Arc<MemoryStore>) -> Router {
        let local = addr("1");
        let (tx, rx) = mpsc::channel(16);
        let election = Arc::new(RingElection::new(
            local.clone(),
            Arc::new(StaticMembership::new(local)),
            Arc::new(RecordingTransport::default()),
            Arc::new(ManualTimers::default()),
            ElectionConfig::default(),
            tx,
        ));
        ElectionDriver::new(Arc::clone(&election), rx).spawn();

        let cache = CacheServer::new(
            store,
            election.clone(),
            Arc::new(LocalCoordinator::new(election.clone())),
        )
        .await;

        HttpServer::new(ApiConfig::default(), "1".into(), election, cache).router()
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_of(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = Arc::new(MemoryStore::default());
        let app = app(store.clone()).await;

        let response = app
            .clone()
            .oneshot(request(Method::PUT, "/cache/docs/a.txt", "hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(request(Method::GET, "/cache/docs/a.txt", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, Bytes::from_static(b"hello"));
        assert_eq!(store.object("docs/a.txt"), Some(Bytes::from_static(b"hello")));
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let app = app(Arc::new(MemoryStore::default())).await;

        let response = app
            .oneshot(request(Method::GET, "/cache/missing", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_empty_object() {
        let app = app(Arc::new(MemoryStore::with_object("empty", ""))).await;

        let response = app
            .oneshot(request(Method::GET, "/cache/empty", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_failed_put() {
        let store = Arc::new(MemoryStore::default());
        store.set_failing(true);
        let app = app(store).await;

        let response = app
            .oneshot(request(Method::PUT, "/cache/a", "data"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let error: ErrorResponse = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(error.code, "TRANSACTION_FAILED");
    }

    #[tokio::test]
    async fn test_delete_not_implemented() {
        let app = app(Arc::new(MemoryStore::with_object("a", "x"))).await;

        let response = app
            .oneshot(request(Method::DELETE, "/cache/a", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_leader_and_status() {
        let app = app(Arc::new(MemoryStore::default())).await;

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/leader", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let leader: LeaderResponse = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(leader.location, "1");
        assert!(leader.is_self);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/status", ""))
            .await
            .unwrap();
        let status: StatusResponse = serde_json::from_slice(&body_of(response).await).unwrap();
        assert_eq!(status.election.leader.as_deref(), Some("1"));
        assert!(!status.election.in_election);
        assert_eq!(status.cached_objects, 0);

        let response = app
            .oneshot(request(Method::GET, "/health", ""))
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body_of(response).await).unwrap();
        assert!(health.healthy);
        assert!(health.is_leader);
    }
}
