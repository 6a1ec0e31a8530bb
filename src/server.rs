//! HTTP API: health check and the OAuth consent/callback routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::OAuthCallback;
use crate::error::ServerError;

pub const SERVICE_NAME: &str = "mail-forward";

/// Shared state for the API routes.
#[derive(Clone, Default)]
pub struct ApiState {
    /// `None` when OAuth is not configured.
    pub oauth: Option<Arc<dyn OAuthCallback>>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": SERVICE_NAME}))
}

fn oauth_not_configured() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "OAuth is not configured"})),
    )
        .into_response()
}

/// GET /api/v1/oauth/url
async fn oauth_url(State(state): State<ApiState>) -> impl IntoResponse {
    match state.oauth {
        Some(oauth) => Json(serde_json::json!({"url": oauth.authorization_url()})).into_response(),
        None => oauth_not_configured(),
    }
}

/// GET /api/v1/oauth/callback?code=..&state=..
///
/// Completes the handshake started from the consent URL.
async fn oauth_callback(
    State(state): State<ApiState>,
    Query(query): Query<CallbackQuery>,
) -> impl IntoResponse {
    let Some(oauth) = state.oauth else {
        return oauth_not_configured();
    };

    let Some(code) = query.code.filter(|c| !c.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "code is required"})),
        )
            .into_response();
    };

    match oauth
        .complete(&code, query.state.as_deref().unwrap_or_default())
        .await
    {
        Ok(()) => Json(serde_json::json!({"message": "success"})).into_response(),
        Err(e) => {
            error!(error = %e, "OAuth callback failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Build the API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/oauth/url", get(oauth_url))
        .route("/api/v1/oauth/callback", get(oauth_callback))
        .with_state(state)
}

/// A running HTTP server with graceful shutdown.
pub struct ApiServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl ApiServer {
    /// Bind `addr` (port 0 picks a free port) and serve `router` in the background.
    pub async fn start(addr: &str, router: Router) -> Result<Self, ServerError> {
        let bind_err = |reason: String| ServerError::Bind {
            addr: addr.to_string(),
            reason,
        };
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| bind_err(e.to_string()))?;
        let local_addr = listener.local_addr().map_err(|e| bind_err(e.to_string()))?;

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let app = router.layer(TraceLayer::new_for_http());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %local_addr, "API server started");
        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal shutdown and wait up to `timeout` for in-flight requests.
    pub async fn stop(self, timeout: Duration) -> Result<(), ServerError> {
        let Self {
            shutdown,
            mut handle,
            ..
        } = self;
        let _ = shutdown.send(());

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {
                info!("API server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(ServerError::Join(e.to_string())),
            Ok(Err(e)) => Err(ServerError::Join(e.to_string())),
            Err(_) => {
                warn!(?timeout, "API server shutdown timed out; aborting");
                handle.abort();
                Err(ServerError::ShutdownTimeout(timeout))
            }
        }
    }
}
