//! HTTP server for metrics and health
//!
//! Exposes Prometheus metrics at `/metrics` and the gate's health report as
//! JSON at `/health`. `/health` answers 503 while the registry is in
//! failover mode so load balancers and health checks see it.

use super::MetricsRegistry;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Source of the `/health` payload
pub trait HealthReporter: Send + Sync {
    fn healthy(&self) -> bool;

    fn report(&self) -> serde_json::Value;
}

/// Configuration for the metrics HTTP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsServerConfig {
    pub enabled: bool,
    /// Address to bind to (e.g., "0.0.0.0:9090")
    pub listen_addr: SocketAddr,
    pub metrics_path: String,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9090)),
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// HTTP server for Prometheus metrics and health
pub struct MetricsServer {
    config: MetricsServerConfig,
    registry: Arc<MetricsRegistry>,
    health: Option<Arc<dyn HealthReporter>>,
}

impl MetricsServer {
    pub fn new(config: MetricsServerConfig, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            config,
            registry,
            health: None,
        }
    }

    pub fn with_health(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.health = Some(reporter);
        self
    }

    /// Serve until `shutdown` flips to true
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("Failed to bind metrics server")?;

        info!(
            "Metrics server listening on http://{}{}",
            self.config.listen_addr, self.config.metrics_path
        );

        let state = Arc::new(self);

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.changed() => {
                    info!("Metrics server stopping");
                    return Ok(());
                }
            };

            let (stream, remote_addr) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let state = state.clone();
                    async move { Ok::<_, hyper::Error>(state.route(req.uri().path())) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    /// Current metrics in Prometheus text format
    pub fn serve_metrics_once(&self) -> Result<String> {
        encode_metrics(&self.registry)
    }

    fn route(&self, path: &str) -> Response<Full<Bytes>> {
        debug!("Metrics request: {}", path);

        if path == "/health" || path == "/healthz" {
            return match &self.health {
                Some(reporter) => {
                    let status = if reporter.healthy() {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    respond(status, "application/json", reporter.report().to_string())
                }
                None => respond(StatusCode::OK, "text/plain", "OK".to_string()),
            };
        }

        if path == self.config.metrics_path {
            return match encode_metrics(&self.registry) {
                Ok(text) => respond(StatusCode::OK, "text/plain; version=0.0.4", text),
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    respond(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain",
                        format!("Error: {}", e),
                    )
                }
            };
        }

        if path == "/" {
            let help_text = format!(
                "Warden Strategy Validation Gate\n\nEndpoints:\n  {} - Prometheus metrics\n  /health - Registry health\n",
                self.config.metrics_path
            );
            return respond(StatusCode::OK, "text/plain", help_text);
        }

        warn!("Unknown metrics endpoint requested: {}", path);
        respond(StatusCode::NOT_FOUND, "text/plain", "Not Found".to_string())
    }
}

fn respond(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    if let Ok(value) = hyper::header::HeaderValue::from_str(content_type) {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, value);
    }
    response
}

/// Encode metrics to Prometheus text format
fn encode_metrics(registry: &MetricsRegistry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.registry().gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;

    String::from_utf8(buffer).context("Invalid UTF-8 in metrics")
}
