use crate::utils::run_cmd;
use async_trait::async_trait;
use color_eyre::{eyre::WrapErr, Result};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

/// Brings a network interface into a usable, addressed state.
#[async_trait]
pub trait InterfaceConfigurator: 'static + Send + Sync {
    async fn activate(&self, iface: &str) -> Result<()>;
}

/// Configures the interface with `ip` and `udhcpc`, switching qmi_wwan to raw IP
/// when the driver exposes the knob.
pub struct LinuxInterface {
    sysfs: PathBuf,
}

impl LinuxInterface {
    pub fn new(sysfs: impl Into<PathBuf>) -> Self {
        Self {
            sysfs: sysfs.into(),
        }
    }
}

#[async_trait]
impl InterfaceConfigurator for LinuxInterface {
    async fn activate(&self, iface: &str) -> Result<()> {
        let raw_ip = self
            .sysfs
            .join("class")
            .join("net")
            .join(iface)
            .join("qmi")
            .join("raw_ip");

        if fs::try_exists(&raw_ip).await.unwrap_or(false) {
            // raw_ip can only be changed while the link is down
            run_cmd("ip", &["link", "set", iface, "down"]).await?;
            fs::write(&raw_ip, "Y")
                .await
                .wrap_err_with(|| format!("failed to enable raw IP on {iface}"))?;
            info!("enabled raw IP mode on {iface}");
        } else {
            debug!("{} not present, leaving link layer as is", raw_ip.display());
        }

        run_cmd("ip", &["link", "set", iface, "up"]).await?;

        info!("Running DHCP client on {iface}...");
        run_cmd("udhcpc", &["-q", "-f", "-n", "-i", iface]).await?;

        Ok(())
    }
}
