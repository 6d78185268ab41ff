use crate::sim::SimCredentials;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Identifies the modem's device nodes and network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemEndpoint {
    /// QMI control device, e.g. `/dev/cdc-wdm0`
    pub qmi_device: PathBuf,
    /// Serial port accepting AT commands
    pub at_port: PathBuf,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// e.g. `wwan0`
    pub interface: String,
    /// Other serial ports the modem exposes (diag, NMEA, ...). Only checked for
    /// presence.
    pub aux_ports: Vec<PathBuf>,
}

impl ModemEndpoint {
    /// Device nodes and the network interface that are not present on this system.
    pub fn missing_devices(&self, sysfs: impl AsRef<Path>) -> Vec<PathBuf> {
        let iface = sysfs.as_ref().join("class").join("net").join(&self.interface);

        [&self.qmi_device, &self.at_port]
            .into_iter()
            .chain(self.aux_ports.iter())
            .cloned()
            .chain(std::iter::once(iface))
            .filter(|p| !p.exists())
            .collect()
    }
}

/// Fixed waits between writing an AT command and draining the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtTimings {
    pub command_settle: Duration,
    pub sms_prompt: Duration,
    pub sms_submit: Duration,
    pub gnss_warmup: Duration,
    pub reboot: Duration,
}

impl Default for AtTimings {
    fn default() -> Self {
        Self {
            command_settle: Duration::from_secs(1),
            sms_prompt: Duration::from_secs(1),
            sms_submit: Duration::from_secs(5),
            gnss_warmup: Duration::from_secs(2),
            reboot: Duration::from_secs(10),
        }
    }
}

impl AtTimings {
    pub fn zero() -> Self {
        Self {
            command_settle: Duration::ZERO,
            sms_prompt: Duration::ZERO,
            sms_submit: Duration::ZERO,
            gnss_warmup: Duration::ZERO,
            reboot: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimings {
    pub mode_settle: Duration,
    pub pin_settle: Duration,
}

impl Default for ConnectTimings {
    fn default() -> Self {
        Self {
            mode_settle: Duration::from_secs(2),
            pin_settle: Duration::from_secs(2),
        }
    }
}

impl ConnectTimings {
    pub fn zero() -> Self {
        Self {
            mode_settle: Duration::ZERO,
            pin_settle: Duration::ZERO,
        }
    }
}

/// How long to keep polling for network registration.
///
/// The first query is always made; `retries` more follow, each after `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            delay: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub probe_target: String,
    pub probe_count: u32,
    pub probe_timeout: Duration,
    /// Marker file whose existence means the outage alert was already sent.
    pub notified_flag: PathBuf,
    /// Phone number receiving outage alerts.
    pub alert_recipient: String,
}

#[derive(Debug)]
pub struct Config {
    pub endpoint: ModemEndpoint,
    pub sim: SimCredentials,
    pub at_timings: AtTimings,
    pub connect_timings: ConnectTimings,
    pub registration: RegistrationPolicy,
    pub monitor: MonitorConfig,
    pub sysfs: PathBuf,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        let endpoint = ModemEndpoint {
            qmi_device: cli.qmi_device,
            at_port: cli.at_port,
            baud_rate: cli.baud_rate,
            read_timeout: Duration::from_millis(cli.read_timeout_ms),
            interface: cli.interface,
            aux_ports: cli.aux_ports,
        };

        let alert_recipient = cli
            .alert_recipient
            .unwrap_or_else(|| cli.phone_number.clone());

        let sim = SimCredentials::new(
            cli.phone_number,
            SecretString::new(cli.pin),
            SecretString::new(cli.puk),
            cli.apn,
        );

        let registration = RegistrationPolicy {
            retries: cli.registration_retries,
            delay: Duration::from_secs(cli.registration_delay),
        };

        let monitor = MonitorConfig {
            poll_interval: Duration::from_secs(cli.poll_interval),
            probe_target: cli.probe_target,
            probe_count: cli.probe_count,
            probe_timeout: Duration::from_secs(cli.probe_timeout),
            notified_flag: cli.notified_flag,
            alert_recipient,
        };

        Self {
            endpoint,
            sim,
            at_timings: AtTimings::default(),
            connect_timings: ConnectTimings::default(),
            registration,
            monitor,
            sysfs: cli.sysfs,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[arg(long, env = "ORB_WWAN_QMI_DEVICE", default_value = "/dev/cdc-wdm0")]
    pub qmi_device: PathBuf,

    #[arg(long, env = "ORB_WWAN_AT_PORT", default_value = "/dev/ttyUSB2")]
    pub at_port: PathBuf,

    #[arg(long, default_value = "115200")]
    pub baud_rate: u32,

    #[arg(long, help = "Serial read timeout in milliseconds", default_value = "1000")]
    pub read_timeout_ms: u64,

    #[arg(long, env = "ORB_WWAN_INTERFACE", default_value = "wwan0")]
    pub interface: String,

    #[arg(
        long = "aux-port",
        help = "Additional modem serial ports that must be present",
        default_values = ["/dev/ttyUSB1", "/dev/ttyUSB3", "/dev/ttyUSB4"]
    )]
    pub aux_ports: Vec<PathBuf>,

    #[arg(long, env = "ORB_WWAN_PHONE_NUMBER")]
    pub phone_number: String,

    #[arg(long, env = "ORB_WWAN_PIN", hide_env_values = true)]
    pub pin: String,

    #[arg(long, env = "ORB_WWAN_PUK", hide_env_values = true)]
    pub puk: String,

    #[arg(long, env = "ORB_WWAN_APN")]
    pub apn: String,

    #[arg(
        long,
        env = "ORB_WWAN_ALERT_RECIPIENT",
        help = "Number receiving outage alerts. Defaults to the SIM's own number"
    )]
    pub alert_recipient: Option<String>,

    #[arg(long, help = "Registration queries after the first one", default_value = "5")]
    pub registration_retries: u32,

    #[arg(long, help = "Seconds between registration queries", default_value = "3")]
    pub registration_delay: u64,

    #[arg(long, help = "Seconds between reachability probes", default_value = "30")]
    pub poll_interval: u64,

    #[arg(long, default_value = "8.8.8.8")]
    pub probe_target: String,

    #[arg(long, default_value = "3")]
    pub probe_count: u32,

    #[arg(long, help = "Per echo timeout in seconds", default_value = "2")]
    pub probe_timeout: u64,

    #[arg(long, default_value = "/usr/persistent/wwan-outage-notified")]
    pub notified_flag: PathBuf,

    #[arg(long, default_value = "/sys")]
    pub sysfs: PathBuf,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Keep the link up and send an SMS on outages (default)
    Monitor,
    /// Run the connection sequence once
    Connect,
    /// Send a single SMS
    Sms {
        #[arg(long)]
        to: String,
        text: String,
    },
    /// Query a GNSS fix and print it as JSON
    Gps,
    /// Reset the modem
    Restart,
}
