use crate::utils::CmdOutput;
use async_trait::async_trait;
use derive_more::Display;
use regex::Regex;
use std::sync::LazyLock;

pub mod cli;

/// Management interface of the modem (QMI). Every call is a one-shot command:
/// failures come back as text in [`CmdOutput::stderr`], never as errors.
#[async_trait]
pub trait ManagementChannel: 'static + Send + Sync {
    async fn operating_mode(&self) -> CmdOutput;
    async fn set_operating_mode_online(&self) -> CmdOutput;
    async fn card_status(&self) -> CmdOutput;
    async fn verify_pin(&self, pin: &str) -> CmdOutput;
    async fn unblock_pin(&self, puk: &str, new_pin: &str) -> CmdOutput;
    async fn registration_state(&self) -> CmdOutput;
    async fn start_network(&self, apn: &str) -> CmdOutput;
    async fn current_settings(&self) -> CmdOutput;
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    #[display("online")]
    Online,
    #[display("offline")]
    Offline,
    #[display("low-power")]
    LowPower,
    #[display("{_0}")]
    Other(String),
}

impl OperatingMode {
    pub fn parse(output: &str) -> Self {
        static RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"Mode:\s*'(?P<mode>[^']+)'").unwrap());

        let mode = RE
            .captures(output)
            .and_then(|c| c.name("mode"))
            .map(|m| m.as_str().to_lowercase());

        match mode.as_deref() {
            Some("online") => OperatingMode::Online,
            Some("offline") => OperatingMode::Offline,
            Some("low-power") => OperatingMode::LowPower,
            Some(other) => OperatingMode::Other(other.to_string()),
            None if output.to_lowercase().contains("offline") => OperatingMode::Offline,
            None => OperatingMode::Other(output.trim().to_string()),
        }
    }

    pub fn needs_online(&self) -> bool {
        matches!(self, OperatingMode::Offline | OperatingMode::LowPower)
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardStatus {
    #[display("ready")]
    Ready,
    #[display("PIN required")]
    PinRequired,
    #[display("PUK required")]
    PukRequired,
    #[display("unknown")]
    Unknown,
}

impl CardStatus {
    /// Understands both `PIN1 state: 'enabled-not-verified'` and the older
    /// `PIN1 (enabled, not verified)` notation.
    pub fn parse(output: &str) -> Self {
        static RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"PIN1 state:\s*'(?P<state>[^']+)'").unwrap()
        });

        let state = RE
            .captures(output)
            .and_then(|c| c.name("state"))
            .map(|m| m.as_str().to_lowercase());

        match state.as_deref() {
            Some("enabled-not-verified") => CardStatus::PinRequired,
            Some("blocked") => CardStatus::PukRequired,
            Some("disabled" | "enabled-verified") => CardStatus::Ready,
            Some(_) => CardStatus::Unknown,
            None if output.contains("PIN1 (enabled, not verified)") => {
                CardStatus::PinRequired
            }
            None if output.contains("PIN1 (blocked)") => CardStatus::PukRequired,
            None if output.contains("PIN1 (disabled)") || output.contains("verified") => {
                CardStatus::Ready
            }
            None => CardStatus::Unknown,
        }
    }
}

pub fn is_registered(output: &str) -> bool {
    output
        .to_lowercase()
        .contains("registration state: 'registered'")
}

pub fn is_network_started(output: &str) -> bool {
    let output = output.to_lowercase();
    output.contains("network started") || output.contains("successfully started network")
}
