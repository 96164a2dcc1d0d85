//! Discovery Metrics
//!
//! Prometheus gauges for the discovery agent and the `/metrics` endpoint.

use crate::error::{Error, Result};
use prometheus::{IntGaugeVec, Opts, Registry};
use std::net::SocketAddr;
use tracing::info;

/// Metrics published by the discovery agent
#[derive(Clone, Debug)]
pub struct DiscoveryMetrics {
    discovered_devices: IntGaugeVec,
}

impl DiscoveryMetrics {
    /// Create the metrics and register them with `registry`
    pub fn register(registry: &Registry) -> Result<Self> {
        let discovered_devices = IntGaugeVec::new(
            Opts::new(
                "fusion_access_discovered_devices",
                "Number of devices found by the last discovery scan",
            ),
            &["node"],
        )
        .map_err(|e| Error::Internal(format!("invalid metric: {}", e)))?;

        registry
            .register(Box::new(discovered_devices.clone()))
            .map_err(|e| Error::Internal(format!("failed to register metric: {}", e)))?;

        Ok(Self { discovered_devices })
    }

    /// Metrics registered with the process-wide default registry
    pub fn register_default() -> Result<Self> {
        Self::register(prometheus::default_registry())
    }

    pub fn set_discovered_devices(&self, node: &str, count: usize) {
        self.discovered_devices
            .with_label_values(&[node])
            .set(count as i64);
    }

    pub fn discovered_devices(&self, node: &str) -> i64 {
        self.discovered_devices.with_label_values(&[node]).get()
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

/// Serve the default registry on `/metrics`
pub async fn run_metrics_server(addr: &str) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};
    use prometheus::{Encoder, TextEncoder};

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, std::convert::Infallible>(service_fn(|req: Request<Body>| async move {
            let mut response = Response::new(Body::empty());
            match req.uri().path() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();
                    if encoder.encode(&prometheus::gather(), &mut buffer).is_err() {
                        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                    } else {
                        if let Ok(value) = encoder.format_type().parse() {
                            response.headers_mut().insert("Content-Type", value);
                        }
                        *response.body_mut() = Body::from(buffer);
                    }
                }
                "/healthz" | "/readyz" => {
                    *response.body_mut() = Body::from("ok");
                }
                _ => {
                    *response.status_mut() = StatusCode::NOT_FOUND;
                    *response.body_mut() = Body::from("not found");
                }
            }
            Ok::<_, std::convert::Infallible>(response)
        }))
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
