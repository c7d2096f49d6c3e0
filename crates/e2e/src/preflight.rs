//! Pre-flight probe: wait for the application under test to answer HTTP

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone)]
pub struct PreflightConfig {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between probes
    pub interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_millis(500),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Poll `base_url` until it answers with anything below 500.
///
/// Login pages commonly redirect or answer 401, so only server errors
/// and transport failures count as "not up yet".
pub async fn wait_for_app(base_url: &str, config: &PreflightConfig) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(base_url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                info!("Application is up at {} ({})", base_url, resp.status());
                return Ok(());
            }
            Ok(resp) => {
                warn!("Pre-flight probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to answer...", base_url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Pre-flight probe error: {}", e);
                }
            }
        }

        if start.elapsed() + config.interval >= config.timeout {
            return Err(E2eError::HealthCheck(attempts));
        }
        sleep(config.interval).await;
    }
}
