//! Monitoring and observability
//!
//! Prometheus metrics, the HTTP endpoint that serves them alongside the
//! registry health report, and the alerting pipeline.

pub mod alerts;
pub mod metrics;
pub mod server;

pub use alerts::{
    Alert, AlertCategory, AlertId, AlertManager, AlertManagerConfig, AlertOutput, AlertSeverity,
    AlertSink, ConsoleSink, FileSink,
};
pub use metrics::{
    GateMetrics, LifecycleMetrics, MetricsRegistry, MonitorMetrics, PersistenceMetrics,
};
pub use server::{HealthReporter, MetricsServer, MetricsServerConfig};
