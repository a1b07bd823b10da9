//! API server setup.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use super::v0;
use crate::api_client::types::ControllerStatus;
use crate::thermal::SharedConfig;
use crate::tracing::prelude::*;

pub const DEFAULT_PORT: u16 = 7786;

#[derive(OpenApi)]
#[openapi(info(
    title = "msm-thermal API",
    description = "Thermal throttling status and runtime configuration"
))]
struct ApiDoc;

/// State shared with every handler.
#[derive(Clone)]
pub struct SharedState {
    pub config: SharedConfig,
    pub status_rx: watch::Receiver<ControllerStatus>,
}

impl SharedState {
    /// Latest controller status, cloned out of the watch channel.
    pub fn status(&self) -> ControllerStatus {
        self.status_rx.borrow().clone()
    }
}

/// Build the application router, including OpenAPI docs.
pub fn router(state: SharedState) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/v0", v0::routes())
        .split_for_parts();

    router
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind API server to {addr}"))?;

    info!(%addr, "API server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server failed")?;

    debug!("API server stopped");
    Ok(())
}
