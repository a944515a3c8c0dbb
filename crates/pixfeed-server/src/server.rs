use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::task::JoinError;

use pixfeed_core::{FeedConfig, NormalizerKind};
use pixfeed_encode::{EncodedImage, ImageMagickNormalizer};

use crate::feed::{self, FeedFailure, FeedService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeedService>,
}

impl AppState {
    pub fn new(service: FeedService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/feed", get(feed_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run_server(config: FeedConfig) -> Result<()> {
    let bind = config.server.bind.clone();

    if config.normalizer.kind == NormalizerKind::ImageMagick
        && !ImageMagickNormalizer::from_config(&config.normalizer).is_available()
    {
        tracing::warn!(
            "ImageMagick normalizer selected but '{}' could not be run; animated requests will fail",
            config.normalizer.program
        );
    }

    let service = FeedService::new(config);
    tracing::info!(
        "Serving {} as {}x{} ({} normalizer)",
        service.config().upstream.url,
        service.config().output.width,
        service.config().output.height,
        service.normalizer_name()
    );
    let app = router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    println!("📡 pixfeed listening on http://{}/feed", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn feed_handler(State(state): State<AppState>) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("feed_request", %request_id);
    let started = Instant::now();

    let service = state.service.clone();
    let worker_span = span.clone();
    let result =
        tokio::task::spawn_blocking(move || worker_span.in_scope(|| service.render())).await;

    span.in_scope(|| respond(result, started))
}

fn respond(
    result: Result<Result<EncodedImage, FeedFailure>, JoinError>,
    started: Instant,
) -> Response {
    match result {
        Ok(Ok(image)) => {
            let digest = feed::digest(&image);
            tracing::info!(
                format = %image.format,
                frames = image.frame_count,
                bytes = image.bytes.len(),
                digest = %digest,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Served feed image"
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, image.mime_type().to_string()),
                    (header::ETAG, digest.to_etag()),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                image.bytes,
            )
                .into_response()
        }
        Ok(Err(failure)) => {
            let message = failure.to_string();
            let stage = failure.stage;
            let kind = failure.error.kind();
            tracing::error!(
                %stage,
                kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Feed request failed: {:?}",
                anyhow::Error::from(failure)
            );
            error_response(message)
        }
        Err(e) => {
            tracing::error!("Feed worker did not complete: {}", e);
            error_response(format!("internal error: {}", e))
        }
    }
}

fn error_response(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        message,
    )
        .into_response()
}

async fn healthz_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = state.service.config();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "upstream": config.upstream.url,
        "target": {
            "width": config.output.width,
            "height": config.output.height,
        },
        "normalizer": state.service.normalizer_name(),
    }))
}
