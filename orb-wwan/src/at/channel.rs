use crate::{config::ModemEndpoint, utils::capture_cmd};
use async_trait::async_trait;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    time,
};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("serial port {} is held by another process:\n{holders}", .path.display())]
    PortBusy { path: PathBuf, holders: String },

    #[error("could not open serial port {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Duplex link to the modem's AT port.
#[async_trait]
pub trait ByteChannel: Send {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;

    /// Returns whatever is buffered right now, possibly nothing. Never waits
    /// longer than the channel's read timeout.
    async fn read_available(&mut self) -> Result<Vec<u8>, ChannelError>;
}

pub struct SerialChannel {
    path: PathBuf,
    port: SerialStream,
    read_timeout: Duration,
}

impl SerialChannel {
    /// Opens the endpoint's AT port, refusing if another process already holds it.
    pub async fn open(endpoint: &ModemEndpoint) -> Result<Self, ChannelError> {
        let path = endpoint.at_port.clone();
        let path_str = path.display().to_string();

        let lsof = capture_cmd("lsof", &[path_str.as_str()]).await;
        if !lsof.stdout.trim().is_empty() {
            return Err(ChannelError::PortBusy {
                holders: lsof.stdout.trim().to_string(),
                path,
            });
        }

        if lsof.stderr.contains("failed to spawn") {
            warn!("could not check whether {path_str} is in use: {}", lsof.stderr);
        }

        let port = tokio_serial::new(&path_str, endpoint.baud_rate)
            .timeout(endpoint.read_timeout)
            .open_native_async()
            .map_err(|source| ChannelError::Open {
                path: path.clone(),
                source,
            })?;

        info!("opened serial port {path_str}");

        Ok(Self {
            path,
            port,
            read_timeout: endpoint.read_timeout,
        })
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        info!("closing serial port {}", self.path.display());
    }
}

#[async_trait]
impl ByteChannel for SerialChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.port.write_all(bytes).await?;
        self.port.flush().await?;

        Ok(())
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut out = Vec::new();

        loop {
            let pending = self.port.bytes_to_read()? as usize;
            if pending == 0 {
                break;
            }

            let mut buf = vec![0u8; pending];
            let n = match time::timeout(self.read_timeout, self.port.read(&mut buf)).await
            {
                Ok(read) => read?,
                Err(_) => break,
            };

            if n == 0 {
                break;
            }

            out.extend_from_slice(&buf[..n]);
        }

        Ok(out)
    }
}

#[async_trait]
impl<T: ByteChannel + ?Sized> ByteChannel for Box<T> {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write(bytes).await
    }

    async fn read_available(&mut self) -> Result<Vec<u8>, ChannelError> {
        (**self).read_available().await
    }
}
