use super::ManagementChannel;
use crate::utils::{capture_cmd, CmdOutput};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// Arguments whose values after the prefix are SIM secrets.
const SECRET_ARGS: [&str; 2] = ["--uim-verify-pin=PIN1,", "--uim-unblock-pin=PIN1,"];

/// [`ManagementChannel`] backed by `qmicli` invocations.
pub struct QmiCli {
    device: PathBuf,
}

impl QmiCli {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }

    /// Runs `qmicli -d <device> args..`. PINs and PUKs are masked in the log.
    pub async fn run(&self, args: &[&str]) -> CmdOutput {
        let device = self.device.display().to_string();
        let mut full = vec!["-d", device.as_str()];
        full.extend_from_slice(args);

        info!("Running: qmicli -d {device} {}", loggable(args));
        let output = capture_cmd("qmicli", &full).await;

        if !output.stdout.trim().is_empty() {
            info!("Output: {}", output.stdout.trim());
        }

        if !output.stderr.trim().is_empty() {
            warn!("Error: {}", output.stderr.trim());
        }

        output
    }
}

#[async_trait]
impl ManagementChannel for QmiCli {
    async fn operating_mode(&self) -> CmdOutput {
        self.run(&["--dms-get-operating-mode"]).await
    }

    async fn set_operating_mode_online(&self) -> CmdOutput {
        self.run(&["--dms-set-operating-mode=online"]).await
    }

    async fn card_status(&self) -> CmdOutput {
        self.run(&["--uim-get-card-status"]).await
    }

    async fn verify_pin(&self, pin: &str) -> CmdOutput {
        let arg = format!("--uim-verify-pin=PIN1,{pin}");
        self.run(&[arg.as_str()]).await
    }

    async fn unblock_pin(&self, puk: &str, new_pin: &str) -> CmdOutput {
        let arg = format!("--uim-unblock-pin=PIN1,{puk},{new_pin}");
        self.run(&[arg.as_str()]).await
    }

    async fn registration_state(&self) -> CmdOutput {
        self.run(&["--nas-get-serving-system"]).await
    }

    async fn start_network(&self, apn: &str) -> CmdOutput {
        let arg = format!("--wds-start-network=apn={apn}");
        self.run(&[arg.as_str(), "--client-no-release-cid"]).await
    }

    async fn current_settings(&self) -> CmdOutput {
        self.run(&["--wds-get-current-settings"]).await
    }
}

fn loggable(args: &[&str]) -> String {
    args.iter()
        .map(|arg| {
            SECRET_ARGS
                .iter()
                .find_map(|prefix| {
                    let secrets = arg.strip_prefix(prefix)?;
                    let masked = vec!["****"; secrets.split(',').count()];

                    Some(format!("{prefix}{}", masked.join(",")))
                })
                .unwrap_or_else(|| arg.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}
