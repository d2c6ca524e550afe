//! HTTP routes in front of the dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use mxsend_smtp::{Delivery, DeliveryError, Dispatcher, ExchangerLookup, Transport};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// Body of `POST /newRequest`.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Sender address; empty for the null reverse-path.
    pub from: String,
    /// Recipients; only the first is used.
    pub to: Vec<String>,
    /// Message text.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
struct SentResponse {
    status: &'static str,
    exchanger: String,
    retried_hosts: usize,
}

impl From<Delivery> for SentResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            status: "sent",
            exchanger: delivery.exchanger,
            retried_hosts: delivery.retried_hosts,
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureEntry {
    host: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<FailureEntry>,
}

/// Maps a failed delivery onto an HTTP status and JSON body.
struct ApiError(DeliveryError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DeliveryError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            DeliveryError::NoExchangersFound { .. } => StatusCode::NOT_FOUND,
            DeliveryError::AllExchangersFailed { .. } => StatusCode::BAD_GATEWAY,
        };
        let error = self.0.to_string();
        let failures = match self.0 {
            DeliveryError::AllExchangersFailed { failures } => failures
                .into_iter()
                .map(|f| FailureEntry {
                    host: f.host,
                    reason: f.reason,
                })
                .collect(),
            _ => Vec::new(),
        };
        (status, Json(ErrorResponse { error, failures })).into_response()
    }
}

/// Builds the router over a shared dispatcher.
pub fn router<L, T>(dispatcher: Arc<Dispatcher<L, T>>) -> Router
where
    L: ExchangerLookup + 'static,
    T: Transport + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/newRequest", post(new_request::<L, T>))
        .with_state(dispatcher)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn new_request<L, T>(
    State(dispatcher): State<Arc<Dispatcher<L, T>>>,
    Json(request): Json<SendRequest>,
) -> Result<Json<SentResponse>, ApiError>
where
    L: ExchangerLookup + 'static,
    T: Transport + 'static,
{
    tracing::info!(from = %request.from, to = ?request.to, "new request");
    dispatcher
        .send_mail(&request.from, &request.to, request.body)
        .await
        .map(|delivery| Json(delivery.into()))
        .map_err(|e| {
            tracing::warn!(error = %e, "delivery failed");
            ApiError(e)
        })
}

/// Serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(addr: SocketAddr, router: Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
