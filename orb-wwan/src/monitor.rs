use crate::{
    at::{channel::ByteChannel, AtSession, SmsOutcome},
    connection::{ConnectionState, Connector, FailureReason},
    flag::FlagStore,
    reachability::Reachability,
    utils::sleep_or_cancel,
};
use async_trait::async_trait;
use bon::bon;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait Notifier: Send {
    async fn notify(&mut self, text: &str) -> SmsOutcome;
}

/// Sends notifications as SMS to a fixed recipient.
pub struct SmsNotifier<C = Box<dyn ByteChannel>> {
    at: Option<AtSession<C>>,
    recipient: String,
}

impl<C: ByteChannel> SmsNotifier<C> {
    /// `at` is `None` when the AT port could not be opened; every notification
    /// then fails without touching the modem.
    pub fn new(at: Option<AtSession<C>>, recipient: impl Into<String>) -> Self {
        Self {
            at,
            recipient: recipient.into(),
        }
    }
}

#[async_trait]
impl<C: ByteChannel> Notifier for SmsNotifier<C> {
    async fn notify(&mut self, text: &str) -> SmsOutcome {
        match self.at.as_mut() {
            Some(at) => at.send_sms(&self.recipient, text).await,
            None => {
                error!("Serial port not available. SMS not sent.");
                SmsOutcome::Failed("serial port not available".into())
            }
        }
    }
}

/// What a single monitor cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cycle {
    Up,
    Recovered,
    Alerted(ConnectionState),
    AlertFailed(ConnectionState),
    Suppressed,
    Reconnected(ConnectionState),
    /// Shutdown was requested; nothing was alerted or persisted.
    Cancelled,
}

/// Polls reachability and reconnects on outages, sending one alert per outage.
///
/// An outage episode starts with the first failed probe and ends with the first
/// successful one. The persisted flag is set once the alert was delivered and
/// cleared on recovery, so restarts inside an episode do not re-alert. An
/// in-memory copy keeps the episode notified when the flag store fails.
pub struct ConnectivityMonitor<R, C, N, F> {
    probe: R,
    connector: C,
    notifier: N,
    flag: F,
    poll_interval: Duration,
    cancel: CancellationToken,
    /// Alert delivered in the current episode, independent of the flag store.
    notified: bool,
    /// Last connect attempt of the current episode failed (or is unknown after
    /// a restart), so a flagged outage should still try to reconnect.
    reconnect_pending: bool,
}

#[bon]
impl<R, C, N, F> ConnectivityMonitor<R, C, N, F>
where
    R: Reachability,
    C: Connector,
    N: Notifier,
    F: FlagStore,
{
    #[builder]
    pub fn new(
        probe: R,
        connector: C,
        notifier: N,
        flag: F,
        #[builder(default = Duration::from_secs(30))] poll_interval: Duration,
        #[builder(default)] cancel: CancellationToken,
    ) -> Self {
        Self {
            probe,
            connector,
            notifier,
            flag,
            poll_interval,
            cancel,
            notified: false,
            reconnect_pending: true,
        }
    }

    /// Runs cycles until the cancellation token fires.
    pub async fn run(&mut self) {
        info!(
            "starting connectivity monitor, polling every {:?}",
            self.poll_interval
        );

        loop {
            if self.tick().await == Cycle::Cancelled {
                break;
            }

            if !sleep_or_cancel(self.poll_interval, &self.cancel).await {
                break;
            }
        }

        info!("connectivity monitor stopped");
    }

    pub async fn tick(&mut self) -> Cycle {
        if self.cancel.is_cancelled() {
            return Cycle::Cancelled;
        }

        let reachable = self.probe.probe().await;
        let persisted = self.flag.is_set().await.unwrap_or_else(|e| {
            error!("failed to read outage flag, using in-memory state: {e}");
            false
        });
        let flagged = persisted || self.notified;

        match (reachable, flagged) {
            (true, true) => {
                match self.flag.clear().await {
                    Ok(()) => info!("connectivity restored, outage flag cleared"),
                    Err(e) => error!("connectivity restored, failed to clear flag: {e}"),
                }
                self.notified = false;
                self.reconnect_pending = false;

                Cycle::Recovered
            }

            (true, false) => {
                debug!("link up");
                self.reconnect_pending = false;

                Cycle::Up
            }

            (false, false) => {
                warn!("connectivity lost, reconnecting");
                let Some(state) = self.reconnect().await else {
                    return Cycle::Cancelled;
                };
                let text = alert_text(Utc::now(), &state);

                match self.notifier.notify(&text).await {
                    SmsOutcome::Sent => {
                        self.notified = true;
                        if let Err(e) = self.flag.set().await {
                            error!("outage alert sent but flag not persisted: {e}");
                        }
                        info!("outage alert sent");

                        Cycle::Alerted(state)
                    }

                    SmsOutcome::Failed(reason) => {
                        warn!("outage alert not delivered ({reason}), retrying next cycle");

                        Cycle::AlertFailed(state)
                    }
                }
            }

            (false, true) if self.reconnect_pending => {
                info!("outage already notified, retrying connection");

                match self.reconnect().await {
                    Some(state) => Cycle::Reconnected(state),
                    None => Cycle::Cancelled,
                }
            }

            (false, true) => {
                info!("outage already notified, skipping alert");

                Cycle::Suppressed
            }
        }
    }

    /// `None` if shutdown interrupted the attempt.
    async fn reconnect(&mut self) -> Option<ConnectionState> {
        let state = self.connector.connect().await;

        if self.cancel.is_cancelled()
            || state == ConnectionState::Failed(FailureReason::Cancelled)
        {
            info!("reconnect interrupted by shutdown");
            return None;
        }

        self.reconnect_pending = state.is_failed();

        Some(state)
    }
}

fn alert_text(at: DateTime<Utc>, state: &ConnectionState) -> String {
    let reconnect = if state.is_up() {
        "reconnected".to_string()
    } else {
        format!("reconnect {state}")
    };

    format!(
        "WWAN outage detected at {}. Modem {reconnect}.",
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        at::tests::{modem_replies, ScriptedChannel},
        config::AtTimings,
    };
    use chrono::TimeZone;

    #[test]
    fn it_formats_alerts() {
        let at = Utc.with_ymd_and_hms(2025, 10, 14, 12, 56, 33).unwrap();

        assert_eq!(
            alert_text(at, &ConnectionState::Up),
            "WWAN outage detected at 2025-10-14 12:56:33 UTC. Modem reconnected."
        );
        assert_eq!(
            alert_text(at, &ConnectionState::Failed(FailureReason::NotRegistered)),
            "WWAN outage detected at 2025-10-14 12:56:33 UTC. Modem reconnect Failed(not registered)."
        );
    }

    #[tokio::test]
    async fn sms_notifier_sends_to_recipient() {
        let channel = ScriptedChannel::new(modem_replies);
        let writes = channel.writes.clone();
        let at = AtSession::new(channel, AtTimings::zero());
        let mut notifier = SmsNotifier::new(Some(at), "+4917000000");

        let outcome = notifier.notify("down").await;

        assert_eq!(outcome, SmsOutcome::Sent);
        assert!(writes
            .lock()
            .unwrap()
            .contains(&"AT+CMGS=\"+4917000000\"\r".to_string()));
    }

    #[tokio::test]
    async fn sms_notifier_without_port_fails() {
        let mut notifier = SmsNotifier::<ScriptedChannel>::new(None, "+49");

        assert!(!notifier.notify("down").await.is_sent());
    }
}
