use at::{
    channel::{ByteChannel, SerialChannel},
    AtSession, SmsOutcome,
};
use color_eyre::{
    eyre::{bail, OptionExt as _, WrapErr as _},
    Result,
};
use config::{Command, Config};
use connection::ConnectionMachine;
use flag::FileFlagStore;
use modem::Modem;
use monitor::{ConnectivityMonitor, SmsNotifier};
use netif::LinuxInterface;
use qmi::cli::QmiCli;
use reachability::PingProbe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub mod at;
pub mod config;
pub mod connection;
pub mod flag;
pub mod gps;
pub mod modem;
pub mod monitor;
pub mod netif;
pub mod qmi;
pub mod reachability;
pub mod sim;
pub mod telemetry;

mod utils;

pub use utils::CmdOutput;

/// Wires the real modem collaborators together and runs `command` to completion.
#[bon::builder(finish_fn = run)]
pub async fn program(
    config: Config,
    command: Command,
    #[builder(default)] cancel: CancellationToken,
) -> Result<()> {
    let endpoint = Arc::new(config.endpoint);

    let at = match SerialChannel::open(&endpoint).await {
        Ok(channel) => {
            let channel: Box<dyn ByteChannel> = Box::new(channel);
            Some(AtSession::new(channel, config.at_timings))
        }

        Err(e) => {
            error!("Failed to open serial port: {e}");
            None
        }
    };

    let connection = ConnectionMachine::builder()
        .endpoint(endpoint.clone())
        .sim(config.sim)
        .mgmt(QmiCli::new(&endpoint.qmi_device))
        .netif(LinuxInterface::new(&config.sysfs))
        .registration(config.registration)
        .timings(config.connect_timings)
        .cancel(cancel.clone())
        .build();

    let mut modem = Modem::new(connection, at);

    match command {
        Command::Monitor => {
            let monitor_cfg = config.monitor;
            let (connection, at) = modem.into_parts();

            ConnectivityMonitor::builder()
                .probe(PingProbe::new(
                    monitor_cfg.probe_target,
                    monitor_cfg.probe_count,
                    monitor_cfg.probe_timeout,
                ))
                .connector(connection)
                .notifier(SmsNotifier::new(at, monitor_cfg.alert_recipient))
                .flag(FileFlagStore::new(monitor_cfg.notified_flag))
                .poll_interval(monitor_cfg.poll_interval)
                .cancel(cancel)
                .build()
                .run()
                .await;
        }

        Command::Connect => {
            let state = modem.connect().await;
            if !state.is_up() {
                bail!("connection attempt ended in {state}");
            }
        }

        Command::Sms { to, text } => {
            if let SmsOutcome::Failed(reason) = modem.send_sms(&to, &text).await {
                bail!("SMS to {to} not sent: {reason}");
            }
        }

        Command::Gps => {
            let fix = modem
                .get_gps_info()
                .await
                .ok_or_eyre("no GNSS response from modem")?;

            info!("GNSS fix: {fix}");
            let json =
                serde_json::to_string_pretty(&fix).wrap_err("failed to encode fix")?;
            println!("{json}");
        }

        Command::Restart => modem.restart_modem().await?,
    }

    Ok(())
}
