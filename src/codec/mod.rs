// Envelope Codec
// JSON encoding with optional gzip framing, plus the legacy path form

use crate::error::{MetricsError, Result};
use crate::metrics::{Envelope, Metric, MetricKind, MetricValue};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Content-Encoding token for gzip framed bodies
pub const GZIP: &str = "gzip";

/// Encode a metric as a JSON envelope
pub fn encode(metric: &Metric) -> Result<Vec<u8>> {
    encode_envelope(&metric.to_envelope())
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>> {
    serde_json::to_vec(envelope)
        .map_err(|e| MetricsError::malformed(format!("failed to encode envelope: {}", e)))
}

/// Decode and validate an update envelope
pub fn decode(bytes: &[u8]) -> Result<Metric> {
    Metric::try_from(decode_envelope(bytes)?)
}

/// Decode a raw envelope without checking its payload
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(bytes).map_err(|e| MetricsError::malformed(e.to_string()))
}

/// Gzip a body
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 32), Compression::default());
    let compress_err = |e: std::io::Error| MetricsError::malformed(format!("gzip compression failed: {}", e));
    encoder.write_all(bytes).map_err(compress_err)?;
    encoder.finish().map_err(compress_err)
}

/// Gunzip a body
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MetricsError::malformed(format!("invalid gzip body: {}", e)))?;
    Ok(out)
}

/// Whether a Content-Encoding header value announces gzip
pub fn is_gzip(content_encoding: Option<&str>) -> bool {
    content_encoding
        .map(|v| v.split(',').any(|token| token.trim().eq_ignore_ascii_case(GZIP)))
        .unwrap_or(false)
}

/// Undo the transfer framing of a body according to its Content-Encoding
pub fn unwrap_body(content_encoding: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
    if is_gzip(content_encoding) {
        decompress(body)
    } else {
        Ok(body.to_vec())
    }
}

/// Decode an envelope from a body that may or may not be gzipped
pub fn decode_body(content_encoding: Option<&str>, body: &[u8]) -> Result<Envelope> {
    decode_envelope(&unwrap_body(content_encoding, body)?)
}

/// Parse the positional segments of `/update/{type}/{name}/{value}`
///
/// Returns `NotFound` for an empty name, matching the legacy route's 404.
pub fn decode_legacy(kind: &str, name: &str, value: &str) -> Result<Metric> {
    if name.is_empty() {
        return Err(MetricsError::not_found(kind, name));
    }
    let kind = kind.parse::<MetricKind>()?;
    let value = MetricValue::parse(kind, value)?;
    Ok(Metric {
        name: name.to_string(),
        value,
    })
}

/// Path used by the legacy form for a metric
pub fn legacy_path(metric: &Metric) -> String {
    format!("/update/{}/{}/{}", metric.kind(), metric.name, metric.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_body_decodes() {
        let raw = encode(&Metric::gauge("Alloc", 1024.0)).unwrap();
        let packed = compress(&raw).unwrap();
        assert_ne!(packed, raw);

        let envelope = decode_body(Some("gzip"), &packed).unwrap();
        assert_eq!(envelope.id, "Alloc");
        assert_eq!(envelope.value, Some(1024.0));
    }

    #[test]
    fn test_plain_body_decodes() {
        let envelope = decode_body(None, br#"{"id":"Hits","type":"counter","delta":2}"#).unwrap();
        assert_eq!(envelope.delta, Some(2));
    }

    #[test]
    fn test_gzip_header_without_gzip_body() {
        let result = decode_body(Some("gzip"), br#"{"id":"Hits"}"#);
        assert!(matches!(result, Err(MetricsError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_is_gzip_tokens() {
        assert!(is_gzip(Some("gzip")));
        assert!(is_gzip(Some("deflate, GZIP")));
        assert!(!is_gzip(Some("br")));
        assert!(!is_gzip(None));
    }

    #[test]
    fn test_unparseable_json() {
        assert!(matches!(decode(b"{not json"), Err(MetricsError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_gauge_without_value() {
        let result = decode(br#"{"id":"Temp","type":"gauge"}"#);
        assert!(matches!(result, Err(MetricsError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_null_payload_is_absent() {
        let result = decode(br#"{"id":"Hits","type":"counter","delta":null}"#);
        assert!(matches!(result, Err(MetricsError::MalformedEnvelope(_))));
    }

    #[test]
    fn test_legacy_decode() {
        assert_eq!(decode_legacy("gauge", "Temp", "37.5").unwrap(), Metric::gauge("Temp", 37.5));
        assert_eq!(decode_legacy("counter", "Hits", "5").unwrap(), Metric::counter("Hits", 5));

        assert!(matches!(
            decode_legacy("counter", "", "5"),
            Err(MetricsError::NotFound { .. })
        ));
        assert!(matches!(
            decode_legacy("timer", "Hits", "5"),
            Err(MetricsError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            decode_legacy("counter", "Hits", "0x10"),
            Err(MetricsError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_legacy_path() {
        assert_eq!(legacy_path(&Metric::gauge("Temp", 37.5)), "/update/gauge/Temp/37.5");
        assert_eq!(legacy_path(&Metric::counter("Hits", 3)), "/update/counter/Hits/3");
    }
}
