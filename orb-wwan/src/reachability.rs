use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait Reachability: 'static + Send + Sync {
    async fn probe(&self) -> bool;
}

/// ICMP echo probe through the system `ping`.
pub struct PingProbe {
    target: String,
    count: u32,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(target: impl Into<String>, count: u32, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            count,
            timeout,
        }
    }
}

#[async_trait]
impl Reachability for PingProbe {
    async fn probe(&self) -> bool {
        let count = self.count.max(1).to_string();
        let timeout = self.timeout.as_secs().max(1).to_string();

        let status = Command::new("ping")
            .args([
                "-c",
                count.as_str(),
                "-W",
                timeout.as_str(),
                self.target.as_str(),
            ])
            .output()
            .await;

        match status {
            Ok(output) => {
                debug!(
                    "ping {}: {}",
                    self.target,
                    String::from_utf8_lossy(&output.stdout).trim()
                );

                output.status.success()
            }

            Err(e) => {
                warn!("failed to run ping: {e}");
                false
            }
        }
    }
}
