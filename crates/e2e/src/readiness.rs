//! Readiness polling for the server under test

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{HarnessError, HarnessResult};

/// Poll `url` until it answers with a 2xx status or `timeout` elapses.
pub async fn wait_until_ready(
    url: &str,
    timeout: Duration,
    poll: Duration,
    accept_invalid_certs: bool,
) -> HarnessResult<u32> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()?;

    let deadline = Instant::now() + timeout;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("{} is ready after {} attempt(s)", url, attempts);
                return Ok(attempts);
            }
            Ok(resp) => {
                warn!("Readiness check returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to come up...", url);
                }
                // Connection refused is expected while the server starts
                if !e.is_connect() {
                    warn!("Readiness check error: {}", e);
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(HarnessError::WaitTimeout {
                selector: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        sleep(poll.max(Duration::from_millis(1))).await;
    }
}
