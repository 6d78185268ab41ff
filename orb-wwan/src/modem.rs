use crate::{
    at::{channel::ByteChannel, AtSession, SmsOutcome},
    connection::{ConnectionMachine, ConnectionState},
    gps::GpsFix,
    netif::InterfaceConfigurator,
    qmi::ManagementChannel,
};
use color_eyre::{eyre::eyre, Result};
use tracing::error;

/// One modem, reachable over QMI for the data link and over an optional AT port
/// for SMS, GNSS and resets.
pub struct Modem<M, I, C = Box<dyn ByteChannel>> {
    connection: ConnectionMachine<M, I>,
    at: Option<AtSession<C>>,
}

impl<M, I, C> Modem<M, I, C>
where
    M: ManagementChannel,
    I: InterfaceConfigurator,
    C: ByteChannel,
{
    pub fn new(connection: ConnectionMachine<M, I>, at: Option<AtSession<C>>) -> Self {
        Self { connection, at }
    }

    pub async fn connect(&mut self) -> ConnectionState {
        self.connection.connect().await
    }

    pub async fn send_sms(&mut self, number: &str, text: &str) -> SmsOutcome {
        match self.at.as_mut() {
            Some(at) => at.send_sms(number, text).await,
            None => {
                error!("Serial port not available. SMS not sent.");
                SmsOutcome::Failed("serial port not available".into())
            }
        }
    }

    pub async fn get_gps_info(&mut self) -> Option<GpsFix> {
        match self.at.as_mut() {
            Some(at) => at.get_gps_info().await,
            None => {
                error!("Serial port not available. Cannot query GNSS.");
                None
            }
        }
    }

    pub async fn restart_modem(&mut self) -> Result<()> {
        let at = self
            .at
            .as_mut()
            .ok_or_else(|| eyre!("serial port not available"))?;

        at.restart_modem().await?;

        Ok(())
    }

    pub fn into_parts(self) -> (ConnectionMachine<M, I>, Option<AtSession<C>>) {
        (self.connection, self.at)
    }
}
