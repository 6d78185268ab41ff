pub mod channel;

use crate::{
    config::AtTimings,
    gps::{parse_cgnsinf, GpsFix},
};
use channel::{ByteChannel, ChannelError};
use derive_more::Display;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};

/// Ctrl+Z, ends the SMS body in text mode.
const SMS_SUBMIT: u8 = 0x1A;
const ESC: u8 = 0x1B;

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum SmsOutcome {
    #[display("sent")]
    Sent,
    #[display("failed: {_0}")]
    Failed(String),
}

impl SmsOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SmsOutcome::Sent)
    }
}

/// Command/response exchanges over the modem's AT port.
///
/// Responses are collected by time, not by pattern: after writing a command
/// the session waits a fixed settle time and then takes whatever the modem
/// has emitted, unsolicited lines included.
pub struct AtSession<C = Box<dyn ByteChannel>> {
    channel: C,
    timings: AtTimings,
}

impl<C: ByteChannel> AtSession<C> {
    pub fn new(channel: C, timings: AtTimings) -> Self {
        Self { channel, timings }
    }

    /// Writes `cmd` terminated by `\r`, waits `settle` and returns everything the
    /// modem produced in the meantime. Invalid UTF-8 is replaced, never an error.
    pub async fn send_command(
        &mut self,
        cmd: &str,
        settle: Duration,
    ) -> Result<String, ChannelError> {
        self.channel.write(format!("{cmd}\r").as_bytes()).await?;
        time::sleep(settle).await;

        let response = self.drain().await?;
        info!(
            "--- {cmd} response ---\n{}\n----------------------",
            response.trim()
        );

        Ok(response)
    }

    async fn command(&mut self, cmd: &str) -> Result<String, ChannelError> {
        self.send_command(cmd, self.timings.command_settle).await
    }

    async fn drain(&mut self) -> Result<String, ChannelError> {
        let bytes = self.channel.read_available().await?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Sends `text` to `number` in GSM text mode.
    ///
    /// Errors are logged and folded into [`SmsOutcome::Failed`].
    pub async fn send_sms(&mut self, number: &str, text: &str) -> SmsOutcome {
        if text.bytes().any(|b| b == SMS_SUBMIT || b == ESC) {
            error!("SMS body contains a control character, not sending");
            return SmsOutcome::Failed("message contains Ctrl+Z or ESC".into());
        }

        match self.try_send_sms(number, text).await {
            Ok(SmsOutcome::Sent) => {
                info!("SMS to {number} sent");
                SmsOutcome::Sent
            }

            Ok(SmsOutcome::Failed(reason)) => {
                error!("SMS to {number} not sent: {reason}");
                SmsOutcome::Failed(reason)
            }

            Err(e) => {
                error!("error sending SMS: {e}");
                SmsOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_send_sms(
        &mut self,
        number: &str,
        text: &str,
    ) -> Result<SmsOutcome, ChannelError> {
        self.command("AT").await?;
        self.command("AT+CMGF=1").await?;
        self.command(r#"AT+CSCS="GSM""#).await?;

        let prompt = self.command(&format!(r#"AT+CMGS="{number}""#)).await?;
        if let Some(line) = prompt.lines().find(|l| is_error_line(l)) {
            return Ok(SmsOutcome::Failed(format!(
                "AT+CMGS rejected: {}",
                line.trim()
            )));
        }

        time::sleep(self.timings.sms_prompt).await;
        if !prompt.contains('>') {
            warn!("no SMS input prompt seen yet, writing body anyway");
        }

        let mut body = text.as_bytes().to_vec();
        body.push(SMS_SUBMIT);
        self.channel.write(&body).await?;

        info!("waiting for modem to send SMS...");
        time::sleep(self.timings.sms_submit).await;

        let response = self.drain().await?;
        info!(
            "--- Final response ---\n{}\n----------------------",
            response.trim()
        );

        Ok(classify_submit_response(&response))
    }

    /// Powers the GNSS engine on, reads one fix, powers it off again.
    ///
    /// `None` if the port fails during the exchange.
    pub async fn get_gps_info(&mut self) -> Option<GpsFix> {
        let fix = async {
            self.command("AT+CGNSPWR=1").await?;
            time::sleep(self.timings.gnss_warmup).await;
            let raw = self.command("AT+CGNSINF").await?;

            Ok::<_, ChannelError>(parse_cgnsinf(&raw))
        }
        .await;

        if let Err(e) = self.command("AT+CGNSPWR=0").await {
            warn!("failed to power off GNSS: {e}");
        }

        fix.inspect_err(|e| error!("failed to query GNSS: {e}")).ok()
    }

    /// Full functional reset. Does not check that the modem comes back.
    pub async fn restart_modem(&mut self) -> Result<(), ChannelError> {
        self.command("AT+CFUN=1,1").await?;
        info!("sent modem reset command, waiting {:?}", self.timings.reboot);
        time::sleep(self.timings.reboot).await;

        Ok(())
    }
}

fn is_error_line(line: &str) -> bool {
    let line = line.trim();

    line == "ERROR" || line.starts_with("+CMS ERROR") || line.starts_with("+CME ERROR")
}

/// Only whole result lines count. With echo on the modem repeats the body, so
/// anything up to the last Ctrl+Z is ignored.
fn classify_submit_response(response: &str) -> SmsOutcome {
    let result = response
        .rsplit_once(char::from(SMS_SUBMIT))
        .map_or(response, |(_, after)| after);

    if let Some(line) = result.lines().find(|l| is_error_line(l)) {
        return SmsOutcome::Failed(format!("modem rejected message: {}", line.trim()));
    }

    let confirmed = result.lines().map(str::trim).any(|line| {
        line == "OK" || line.starts_with("+CMGS:")
    });

    if confirmed {
        SmsOutcome::Sent
    } else {
        SmsOutcome::Failed("no confirmation from modem".into())
    }
}
