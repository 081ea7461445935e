// Ingestion API
// Routing table for the aggregator's HTTP surface

pub mod handlers;
pub mod listener;

use crate::observability;
use crate::storage::MetricStore;
use anyhow::Result;
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tracing::{info, Instrument};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricStore>,
}

/// Build the routing table
///
/// Legacy and structured forms are separate routes; neither falls through
/// into the other.
pub fn router(store: Arc<MetricStore>) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/", get(handlers::index))
        .route("/update/:kind/:name/:value", post(handlers::legacy_update))
        .route("/update/:kind/:name/", post(handlers::legacy_update_empty_value))
        .route("/update/", post(handlers::update_json))
        .route("/value/:kind/:name", get(handlers::legacy_value))
        .route("/value/", post(handlers::value_json))
        .fallback(handlers::not_found)
        .layer(CompressionLayer::new().gzip(true))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Log one event per request without touching the response
async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().to_string();
    let span = observability::request_span(method.as_str(), req.uri().path());
    let start = Instant::now();

    let response = next.run(req).instrument(span.clone()).await;

    let response_size = response
        .headers()
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let _entered = span.enter();
    observability::record_request(
        method.as_str(),
        &uri,
        response.status().as_u16(),
        start.elapsed().as_millis() as u64,
        response_size,
    );

    response
}

/// Serve the Ingestion API until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, store: Arc<MetricStore>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Ingestion API listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Ingestion API stopped accepting connections");
    Ok(())
}
