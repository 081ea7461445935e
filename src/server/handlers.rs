// Ingestion API handlers
// Legacy path routes answer with bare status codes, structured routes with JSON

use super::AppState;
use crate::codec;
use crate::error::MetricsError;
use crate::metrics::{Metric, MetricKind};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, warn};

/// Map a domain error onto its HTTP status
pub fn status_for(err: &MetricsError) -> StatusCode {
    match err {
        MetricsError::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
        MetricsError::NotFound { .. } => StatusCode::NOT_FOUND,
        MetricsError::Transport(_) | MetricsError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error returned by the structured routes, rendered with a message body
#[derive(Debug)]
pub struct ApiError(pub MetricsError);

impl From<MetricsError> for ApiError {
    fn from(err: MetricsError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("{}\n", self.0),
        )
            .into_response()
    }
}

/// `POST /update/{type}/{name}/{value}`
pub async fn legacy_update(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Response {
    apply_legacy(&state, &kind, &name, &value)
}

/// `POST /update/{type}/{name}/` - the value segment is present but empty
pub async fn legacy_update_empty_value(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    apply_legacy(&state, &kind, &name, "")
}

fn apply_legacy(state: &AppState, kind: &str, name: &str, value: &str) -> Response {
    match codec::decode_legacy(kind, name, value) {
        Ok(update) => {
            state.store.apply(&update);
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")]).into_response()
        }
        Err(err) => {
            debug!(error = %err, "Legacy update rejected");
            status_for(&err).into_response()
        }
    }
}

/// `GET /value/{type}/{name}`
///
/// An unknown type is indistinguishable from an unknown metric here: both 404.
pub async fn legacy_value(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = kind.parse::<MetricKind>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.store.get(kind, &name) {
        Ok(metric) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            metric.value.to_string(),
        )
            .into_response(),
        Err(err) => status_for(&err).into_response(),
    }
}

/// `POST /update/`
pub async fn update_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let envelope = read_envelope(&headers, &body)?;
    let update = Metric::try_from(envelope)?;
    let stored = state.store.apply(&update);
    Ok(json_response(&stored)?)
}

/// `POST /value/`
pub async fn value_json(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let envelope = read_envelope(&headers, &body)?;
    let (kind, name) = envelope.identity()?;
    let current = state.store.get(kind, name)?;
    Ok(json_response(&current)?)
}

/// `GET /` - HTML listing of every metric
pub async fn index(State(state): State<AppState>) -> Html<String> {
    let snapshot = state.store.snapshot_all();

    let mut html = String::from("<html><body><h1>Metrics</h1><h2>Gauges</h2><ul>");
    for (name, value) in &snapshot.gauges {
        html.push_str(&format!("<li>{}: {}</li>", escape_html(name), value));
    }
    html.push_str("</ul><h2>Counters</h2><ul>");
    for (name, value) in &snapshot.counters {
        html.push_str(&format!("<li>{}: {}</li>", escape_html(name), value));
    }
    html.push_str("</ul></body></html>");

    Html(html)
}

/// Anything the routing table does not know
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn read_envelope(headers: &HeaderMap, body: &[u8]) -> Result<crate::metrics::Envelope, MetricsError> {
    if !is_json(headers) {
        return Err(MetricsError::malformed("Content-Type must be application/json"));
    }
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());
    codec::decode_body(encoding, body)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

fn json_response(metric: &Metric) -> Result<Response, MetricsError> {
    let body = codec::encode(metric)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
