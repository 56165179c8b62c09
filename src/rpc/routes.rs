//! HTTP routes over the indexing engine.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::error;

use crate::error::Error;
use crate::indexer::Engine;
use crate::rpc::middleware::{RequestIdLayer, SecurityHeadersLayer};

// ═══════════════════════════════════════════════════════════════════════════════
// API TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// `?address=` query string
#[derive(Debug, Default, Deserialize)]
pub struct AddressQuery {
    /// Address to act on; empty counts as missing
    pub address: Option<String>,
}

impl AddressQuery {
    fn address(self) -> Result<String, ApiError> {
        match self.address {
            Some(address) if !address.is_empty() => Ok(address),
            _ => Err(ApiError::MissingAddress),
        }
    }
}

/// Handler failure, rendered without internal detail
#[derive(Debug)]
pub enum ApiError {
    /// `address` query parameter absent or empty
    MissingAddress,
    /// Anything the caller cannot fix
    Internal(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MissingAddress => {
                (StatusCode::BAD_REQUEST, "Address is required").into_response()
            }
            ApiError::Internal(e) => {
                error!(code = e.code(), error = %e, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

/// GET /currentBlock - Highest block iterated over
async fn current_block(State(engine): State<Engine>) -> impl IntoResponse {
    engine.current_block().to_string()
}

/// POST /subscribe - Start watching an address
async fn subscribe(
    State(engine): State<Engine>,
    Query(query): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let address = query.address()?;

    if engine.subscribe(&address)? {
        Ok((StatusCode::OK, "Subscribed successfully").into_response())
    } else {
        Ok((StatusCode::CONFLICT, "Address already subscribed").into_response())
    }
}

/// DELETE /subscribe - Stop watching an address
async fn unsubscribe(
    State(engine): State<Engine>,
    Query(query): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let address = query.address()?;

    if engine.unsubscribe(&address)? {
        Ok((StatusCode::OK, "Unsubscribed successfully").into_response())
    } else {
        Ok((StatusCode::NOT_FOUND, "Address not subscribed").into_response())
    }
}

/// GET /transactions - History of a watched address
async fn transactions(
    State(engine): State<Engine>,
    Query(query): Query<AddressQuery>,
) -> Result<Response, ApiError> {
    let address = query.address()?;
    Ok(Json(engine.transactions(&address)?).into_response())
}

/// GET /health - Health check
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": crate::SERVICE_NAME,
        "version": crate::VERSION
    }))
}

/// GET /status - Engine statistics
async fn status(State(engine): State<Engine>) -> Result<Response, ApiError> {
    Ok(Json(engine.statistics()?).into_response())
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the HTTP router over `engine`.
///
/// Methods other than POST and DELETE on `/subscribe` get 405.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/currentBlock", get(current_block))
        .route("/subscribe", post(subscribe).delete(unsubscribe))
        .route("/transactions", get(transactions))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(SecurityHeadersLayer)
        .layer(RequestIdLayer)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::chain::{MockReader, Transaction};
    use crate::indexer::EngineConfig;
    use crate::store::InMemoryTransactionStore;
    use crate::subscriptions::SubscriptionRegistry;

    fn engine(reader: MockReader) -> Engine {
        Engine::new(
            EngineConfig::default(),
            Arc::new(reader),
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(InMemoryTransactionStore::new()),
        )
    }

    async fn send(engine: &Engine, method: Method, uri: &str) -> (StatusCode, String) {
        let response = router(engine.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_current_block() {
        let engine = engine(MockReader::new(42));
        engine.initialize().await.unwrap();

        let (status, body) = send(&engine, Method::GET, "/currentBlock").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "42");
    }

    #[tokio::test]
    async fn test_subscribe_statuses() {
        let engine = engine(MockReader::new(0));

        let (status, body) = send(&engine, Method::POST, "/subscribe?address=0xa").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Subscribed successfully");

        let (status, body) = send(&engine, Method::POST, "/subscribe?address=0xa").await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "Address already subscribed");

        let (status, _) = send(&engine, Method::DELETE, "/subscribe?address=0xa").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&engine, Method::DELETE, "/subscribe?address=0xa").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Address not subscribed");
    }

    #[tokio::test]
    async fn test_missing_address() {
        let engine = engine(MockReader::new(0));

        for (method, uri) in [
            (Method::POST, "/subscribe"),
            (Method::POST, "/subscribe?address="),
            (Method::DELETE, "/subscribe"),
            (Method::GET, "/transactions"),
        ] {
            let (status, body) = send(&engine, method, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body, "Address is required");
        }
    }

    #[tokio::test]
    async fn test_other_methods_on_subscribe() {
        let engine = engine(MockReader::new(0));
        for method in [Method::GET, Method::PUT, Method::PATCH] {
            let (status, _) = send(&engine, method, "/subscribe?address=0xa").await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        }
    }

    #[tokio::test]
    async fn test_transactions_json() {
        let reader = MockReader::new(1).with_block(
            1,
            vec![Transaction::new("0x1234", "0x5678", "0xabcd", 100u32, 1u32)],
        );
        let engine = engine(reader);
        engine.initialize().await.unwrap();

        let (status, body) = send(&engine, Method::GET, "/transactions?address=0x1234").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");

        send(&engine, Method::POST, "/subscribe?address=0x1234").await;
        assert!(engine.drain_backfills(std::time::Duration::from_secs(5)).await);

        let (_, body) = send(&engine, Method::GET, "/transactions?address=0x1234").await;
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "from": "0x1234",
                "to": "0x5678",
                "value": "100",
                "hash": "0xabcd",
                "block": 1
            }])
        );
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let engine = engine(MockReader::new(3));
        engine.initialize().await.unwrap();

        let (status, body) = send(&engine, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["version"], crate::VERSION);

        let (status, body) = send(&engine, Method::GET, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let stats: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(stats["current_block"], 3);
        assert_eq!(stats["phase"]["state"], "polling");
    }
}
