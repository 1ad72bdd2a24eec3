//! Serial console transport using tokio-serial.

use std::io;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use super::Transport;
use super::config::SerialSettings;
use crate::error::{Result, TransportError};

const READ_BUFFER: usize = 4096;

/// Console link over a local serial port.
pub struct SerialTransport {
    port_name: String,
    stream: Option<SerialStream>,
}

impl SerialTransport {
    /// Open `port` with the given line settings.
    pub fn open(port: &str, settings: &SerialSettings) -> Result<Self> {
        let stream = tokio_serial::new(port, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(SerialSettings::DRIVER_TIMEOUT)
            .open_native_async()
            .map_err(|e| TransportError::PortUnavailable {
                port: port.to_string(),
                reason: e.to_string(),
            })?;

        debug!("opened serial port {} at {} baud", port, settings.baud_rate);

        Ok(Self {
            port_name: port.to_string(),
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected.into())
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).await.map_err(TransportError::Io)?;
        stream.flush().await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut buf = vec![0u8; READ_BUFFER];
        let n = loop {
            match stream.read(&mut buf).await {
                Ok(n) => break n,
                // Driver-level read timeout on an idle line, not a failure
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(TransportError::Io(e).into()),
            }
        };
        if n == 0 {
            return Err(TransportError::Disconnected.into());
        }
        buf.truncate(n);
        trace!("{}: read {} bytes", self.port_name, n);
        Ok(buf)
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("closed serial port {}", self.port_name);
        }
        Ok(())
    }
}
