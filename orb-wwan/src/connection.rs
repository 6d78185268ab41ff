use crate::{
    config::{ConnectTimings, ModemEndpoint, RegistrationPolicy},
    netif::InterfaceConfigurator,
    qmi::{
        is_network_started, is_registered, CardStatus, ManagementChannel,
        OperatingMode,
    },
    sim::SimCredentials,
    utils::{sleep_or_cancel, CmdOutput},
};
use async_trait::async_trait;
use bon::bon;
use derive_more::Display;
use secrecy::ExposeSecret;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    #[error("not registered")]
    NotRegistered,
    #[error("session start failed: {0}")]
    SessionStartFailed(String),
    #[error("interface configuration error: {0}")]
    InterfaceConfiguration(String),
    #[error("cancelled")]
    Cancelled,
}

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No bring-up attempted yet.
    Unknown,
    CheckingMode,
    CheckingSim,
    Registering,
    StartingSession,
    ConfiguringInterface,
    Up,
    #[display("Failed({_0})")]
    Failed(FailureReason),
}

impl ConnectionState {
    pub fn is_up(&self) -> bool {
        matches!(self, ConnectionState::Up)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed(_))
    }

    fn is_terminal(&self) -> bool {
        self.is_up() || self.is_failed()
    }
}

#[async_trait]
pub trait Connector: Send {
    /// Runs the bring-up sequence to a terminal state, `Up` or `Failed`.
    async fn connect(&mut self) -> ConnectionState;
}

/// Drives the WWAN bring-up: operating mode, SIM, registration, data session,
/// interface.
///
/// Only registration is retried. Mode and SIM problems are logged and the
/// sequence carries on, since the registration step will fail anyway if they
/// matter.
pub struct ConnectionMachine<M, I> {
    endpoint: Arc<ModemEndpoint>,
    sim: SimCredentials,
    mgmt: M,
    netif: I,
    registration: RegistrationPolicy,
    timings: ConnectTimings,
    cancel: CancellationToken,
    state: ConnectionState,
}

#[bon]
impl<M: ManagementChannel, I: InterfaceConfigurator> ConnectionMachine<M, I> {
    #[builder]
    pub fn new(
        endpoint: Arc<ModemEndpoint>,
        sim: SimCredentials,
        mgmt: M,
        netif: I,
        #[builder(default)] registration: RegistrationPolicy,
        #[builder(default)] timings: ConnectTimings,
        #[builder(default)] cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            sim,
            mgmt,
            netif,
            registration,
            timings,
            cancel,
            state: ConnectionState::Unknown,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub async fn connect(&mut self) -> ConnectionState {
        let mut state = ConnectionState::CheckingMode;

        while !state.is_terminal() {
            self.state = state.clone();

            state = if self.cancel.is_cancelled() {
                ConnectionState::Failed(FailureReason::Cancelled)
            } else {
                self.step(state).await
            };
        }

        match &state {
            ConnectionState::Up => info!("[DONE] WWAN connection should now be up."),
            ConnectionState::Failed(reason) => {
                error!("connection attempt failed: {reason}")
            }
            _ => {}
        }

        self.state = state.clone();

        state
    }

    async fn step(&mut self, state: ConnectionState) -> ConnectionState {
        use ConnectionState::*;

        let result = match state {
            Unknown | CheckingMode => {
                info!("[STEP] Checking modem operating mode...");
                self.ensure_online().await.map(|_| CheckingSim)
            }

            CheckingSim => {
                info!("[STEP] Checking SIM status...");
                self.unlock_sim().await.map(|_| Registering)
            }

            Registering => {
                info!("[STEP] Checking network registration...");
                self.await_registration().await.map(|_| StartingSession)
            }

            StartingSession => {
                info!("[STEP] Starting network session...");
                self.start_session().await.map(|_| ConfiguringInterface)
            }

            ConfiguringInterface => {
                info!("[STEP] Configuring interface...");
                self.configure_interface().await.map(|_| Up)
            }

            Up | Failed(_) => return state,
        };

        result.unwrap_or_else(Failed)
    }

    async fn settle(&self, duration: Duration) -> Result<(), FailureReason> {
        if sleep_or_cancel(duration, &self.cancel).await {
            Ok(())
        } else {
            Err(FailureReason::Cancelled)
        }
    }

    async fn ensure_online(&self) -> Result<(), FailureReason> {
        let mode = OperatingMode::parse(&self.mgmt.operating_mode().await.stdout);

        if mode.needs_online() {
            info!("Modem is {mode}. Switching to online mode...");
            self.mgmt.set_operating_mode_online().await;
            self.settle(self.timings.mode_settle).await?;
        } else {
            info!("Modem operating mode: {mode}");
        }

        Ok(())
    }

    async fn unlock_sim(&self) -> Result<(), FailureReason> {
        let status = CardStatus::parse(&self.mgmt.card_status().await.stdout);

        match status {
            CardStatus::PinRequired => {
                info!("SIM requires PIN. Sending PIN...");
                let out = self.mgmt.verify_pin(self.sim.pin().expose_secret()).await;
                log_stderr("PIN verification", &out);
                self.settle(self.timings.pin_settle).await?;
            }

            CardStatus::PukRequired => {
                warn!("SIM PIN is blocked. Unblocking with stored PUK...");
                let out = self
                    .mgmt
                    .unblock_pin(
                        self.sim.puk().expose_secret(),
                        self.sim.pin().expose_secret(),
                    )
                    .await;
                log_stderr("PIN unblock", &out);
                self.settle(self.timings.pin_settle).await?;
            }

            CardStatus::Ready => info!("SIM is ready."),

            CardStatus::Unknown => {
                warn!("Unexpected SIM status. Proceeding cautiously.")
            }
        }

        Ok(())
    }

    async fn await_registration(&self) -> Result<(), FailureReason> {
        let attempts = self.registration.retries + 1;

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.settle(self.registration.delay).await?;
            }

            if is_registered(&self.mgmt.registration_state().await.stdout) {
                info!("Modem is registered to network.");
                return Ok(());
            }

            info!("Modem not registered ({attempt}/{attempts}).");
        }

        warn!("Modem failed to register after retries.");

        Err(FailureReason::NotRegistered)
    }

    async fn start_session(&self) -> Result<(), FailureReason> {
        let out = self.mgmt.start_network(self.sim.apn()).await;

        if !is_network_started(&out.stdout) {
            let detail = [out.stderr.trim(), out.stdout.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .unwrap_or("no output")
                .to_string();

            return Err(FailureReason::SessionStartFailed(detail));
        }

        info!("Network session started.");

        let settings = self.mgmt.current_settings().await;
        info!("Connection settings:\n{}", settings.stdout.trim());

        Ok(())
    }

    async fn configure_interface(&self) -> Result<(), FailureReason> {
        self.netif
            .activate(&self.endpoint.interface)
            .await
            .map_err(|e| FailureReason::InterfaceConfiguration(format!("{e:#}")))
    }
}

#[async_trait]
impl<M, I> Connector for ConnectionMachine<M, I>
where
    M: ManagementChannel,
    I: InterfaceConfigurator,
{
    async fn connect(&mut self) -> ConnectionState {
        ConnectionMachine::connect(self).await
    }
}

fn log_stderr(what: &str, out: &CmdOutput) {
    if !out.stderr.trim().is_empty() {
        warn!("{what} reported: {}", out.stderr.trim());
    }
}
