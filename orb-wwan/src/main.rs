use clap::Parser;
use color_eyre::eyre::{bail, Result};
use orb_wwan::config::{Cli, Command, Config};
use tokio::signal::unix::{self, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SYSLOG_IDENTIFIER: &str = "worldcoin-wwan";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    orb_wwan::telemetry::init(SYSLOG_IDENTIFIER);

    let cli = Cli::parse();
    let command = cli.command.clone().unwrap_or(Command::Monitor);
    let config = Config::from_cli(cli);

    let missing = config.endpoint.missing_devices(&config.sysfs);
    if !missing.is_empty() {
        for path in &missing {
            error!("required device not found: {}", path.display());
        }

        bail!("{} required modem device(s) missing", missing.len());
    }

    info!("modem: {}", config.sim);

    let cancel = CancellationToken::new();
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    let mut sigint = unix::signal(SignalKind::interrupt())?;

    let program = orb_wwan::program()
        .config(config)
        .command(command)
        .cancel(cancel.clone())
        .run();

    tokio::pin!(program);

    tokio::select! {
        result = &mut program => return result,
        _ = sigterm.recv() => warn!("received SIGTERM"),
        _ = sigint.recv() => warn!("received SIGINT"),
    }

    info!("cancelling and exiting gracefully");
    cancel.cancel();

    program.await
}
