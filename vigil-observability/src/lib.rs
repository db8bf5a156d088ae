pub mod access_log;
pub mod metrics;
pub mod registry;

pub use access_log::{AccessLogWorker, LineSink, TracingLineSink};
pub use metrics::MetricsCollector;
pub use registry::SinkRegistry;
