use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::core::http::build_probe_client;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Network half of the status check.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `true` when the service answers at `host:port`. Any failure is
    /// reported as `false`, never as an error.
    async fn is_reachable(&self, host: &str, port: &str) -> bool;
}

/// TCP connect, then an optional `GET` of a fixed path.
///
/// Any HTTP response counts as reachable, whatever its status: the probe
/// only cares that something is serving requests.
#[derive(Debug, Clone)]
pub struct TcpHttpProbe {
    http_path: Option<String>,
    client: Option<Client>,
}

impl TcpHttpProbe {
    pub fn new(http_path: Option<String>) -> Self {
        let client = match http_path {
            Some(_) => build_probe_client(REQUEST_TIMEOUT)
                .map_err(|e| warn!("Probe HTTP client unavailable, TCP only: {}", e))
                .ok(),
            None => None,
        };
        Self { http_path, client }
    }

    pub fn tcp_only() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl HealthProbe for TcpHttpProbe {
    async fn is_reachable(&self, host: &str, port: &str) -> bool {
        let Ok(port_number) = port.parse::<u16>() else {
            debug!("Probe skipped: invalid port {:?}", port);
            return false;
        };

        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port_number))).await
        {
            Ok(Ok(stream)) => drop(stream),
            Ok(Err(e)) => {
                debug!("Probe connect to {}:{} failed: {}", host, port, e);
                return false;
            }
            Err(_) => {
                debug!("Probe connect to {}:{} timed out", host, port);
                return false;
            }
        }

        let (Some(client), Some(path)) = (&self.client, &self.http_path) else {
            return true;
        };
        let url = format!("http://{host}:{port}{path}");
        match client.get(&url).send().await {
            Ok(response) => {
                debug!("Probe {} answered {}", url, response.status());
                true
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}
