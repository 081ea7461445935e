// metricsd - runtime metrics pipeline
// Reporting agent on one side, aggregation server with snapshot persistence on the other

pub mod agent;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod persistence;
pub mod server;
pub mod signals;
pub mod storage;

pub use error::{MetricsError, PersistenceError};
pub use metrics::{Envelope, Metric, MetricKind, MetricValue};
pub use storage::{FileStorage, MetricStore, Snapshot};
