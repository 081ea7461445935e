// Metric Envelope Model
// Wire representation of one named measurement and its typed form

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metric kind: last-write gauge or additive counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricsError::malformed(format!("unknown metric type '{}'", other))),
        }
    }
}

/// Structured envelope as it travels over the wire
///
/// `type` stays a plain string here so an unknown kind is reported as a
/// malformed envelope instead of a generic JSON error. Exactly one of
/// `delta`/`value` is expected; the unused one is omitted on output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type", default)]
    pub mtype: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Envelope {
    /// Validate identity fields and return the typed kind and name
    ///
    /// Used on its own by value queries, which carry no payload.
    pub fn identity(&self) -> Result<(MetricKind, &str)> {
        if self.id.is_empty() {
            return Err(MetricsError::malformed("id is required"));
        }
        if self.mtype.is_empty() {
            return Err(MetricsError::malformed("type is required"));
        }
        let kind = self.mtype.parse::<MetricKind>()?;
        Ok((kind, self.id.as_str()))
    }
}

/// Payload carried by a metric, tagged by kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse a legacy path segment in the format its kind expects
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self> {
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .map_err(|e| MetricsError::malformed(format!("invalid gauge value '{}': {}", raw, e)))
                .and_then(Self::gauge),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|e| MetricsError::malformed(format!("invalid counter delta '{}': {}", raw, e))),
        }
    }

    fn gauge(value: f64) -> Result<Self> {
        // NaN and infinity have no JSON encoding
        if !value.is_finite() {
            return Err(MetricsError::malformed(format!("gauge value {} is not finite", value)));
        }
        Ok(MetricValue::Gauge(value))
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Rust's f64 Display is already the shortest round-trip form
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Counter(v) => write!(f, "{}", v),
        }
    }
}

/// A validated metric update or result
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    /// Build the wire envelope, leaving the unused payload field absent
    pub fn to_envelope(&self) -> Envelope {
        let (delta, value) = match self.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Envelope {
            id: self.name.clone(),
            mtype: self.kind().as_str().to_string(),
            delta,
            value,
        }
    }
}

impl TryFrom<Envelope> for Metric {
    type Error = MetricsError;

    fn try_from(envelope: Envelope) -> Result<Self> {
        let (kind, _) = envelope.identity()?;
        let value = match kind {
            MetricKind::Gauge => {
                let v = envelope
                    .value
                    .ok_or_else(|| MetricsError::malformed("value is required for gauge"))?;
                MetricValue::gauge(v)?
            }
            MetricKind::Counter => envelope
                .delta
                .map(MetricValue::Counter)
                .ok_or_else(|| MetricsError::malformed("delta is required for counter"))?,
        };
        Ok(Metric {
            name: envelope.id,
            value,
        })
    }
}
