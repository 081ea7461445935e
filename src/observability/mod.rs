// Observability infrastructure using tracing crate
// Structured JSON logging for both the agent and the server

use anyhow::Result;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the observability system
/// Sets up structured logging to stdout with JSON formatting for machine parsing
pub fn init(verbose: bool) -> Result<()> {
    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_current_span(true)
        .with_span_list(false)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE);

    // Example: RUST_LOG=metricsd=debug,tower_http=info
    let default_filter = if verbose {
        "metricsd=debug,tower_http=debug,hyper=warn,reqwest=info"
    } else {
        "metricsd=info,tower_http=info,hyper=warn,reqwest=warn"
    };
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

/// Create a span for an inbound request
#[inline]
pub fn request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = method,
        path = path,
        request_id = %uuid::Uuid::new_v4(),
    )
}

/// Record the outcome of a handled request
#[inline]
pub fn record_request(method: &str, uri: &str, status: u16, duration_ms: u64, response_size: Option<u64>) {
    tracing::info!(
        method = method,
        uri = uri,
        status = status,
        duration_ms = duration_ms,
        response_size = response_size,
        "request completed"
    );
}
