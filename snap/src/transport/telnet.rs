//! Telnet transport over a plain TCP stream.
//!
//! Only as much of RFC 854 as a router's VTY line needs: option
//! negotiation is answered conservatively (accept remote ECHO and
//! SUPPRESS-GO-AHEAD, refuse everything else), subnegotiations are
//! skipped, and `IAC IAC` is unescaped.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Transport;
use crate::error::{Result, TransportError};

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

const OPT_ECHO: u8 = 1;
const OPT_SGA: u8 = 3;

const READ_BUFFER: usize = 4096;

/// Decoder position inside the Telnet command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Data,
    Iac,
    Negotiate(u8),
    Sub,
    SubIac,
}

/// Splits a Telnet byte stream into application data and the replies our
/// side owes the peer.
#[derive(Debug, Default)]
pub(crate) struct TelnetDecoder {
    state: State,
}

impl TelnetDecoder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Decode `input`, appending payload bytes to `data` and negotiation
    /// answers to `replies`. State carries across calls, so commands split
    /// between reads are handled.
    pub(crate) fn decode(&mut self, input: &[u8], data: &mut BytesMut, replies: &mut BytesMut) {
        let mut rest = input;
        while !rest.is_empty() {
            if self.state == State::Data {
                match memchr::memchr(IAC, rest) {
                    Some(pos) => {
                        data.extend_from_slice(&rest[..pos]);
                        self.state = State::Iac;
                        rest = &rest[pos + 1..];
                    }
                    None => {
                        data.extend_from_slice(rest);
                        return;
                    }
                }
                continue;
            }

            let byte = rest[0];
            rest = &rest[1..];
            self.state = match self.state {
                State::Iac => match byte {
                    IAC => {
                        data.put_u8(IAC);
                        State::Data
                    }
                    DO | DONT | WILL | WONT => State::Negotiate(byte),
                    SB => State::Sub,
                    _ => State::Data,
                },
                State::Negotiate(verb) => {
                    if let Some(answer) = Self::answer(verb, byte) {
                        replies.put_slice(&[IAC, answer, byte]);
                    }
                    State::Data
                }
                State::Sub => {
                    if byte == IAC {
                        State::SubIac
                    } else {
                        State::Sub
                    }
                }
                State::SubIac => {
                    if byte == SE {
                        State::Data
                    } else {
                        State::Sub
                    }
                }
                State::Data => State::Data,
            };
        }
    }

    /// Our answer to a negotiation verb for `option`.
    fn answer(verb: u8, option: u8) -> Option<u8> {
        match (verb, option) {
            (WILL, OPT_ECHO) | (WILL, OPT_SGA) => Some(DO),
            (WILL, _) => Some(DONT),
            (DO, OPT_SGA) => Some(WILL),
            (DO, _) => Some(WONT),
            // Acknowledging DONT/WONT would risk a negotiation loop
            _ => None,
        }
    }
}

/// Encode outgoing text: escape `IAC` and turn bare `\n` into `\r\n`.
pub(crate) fn encode(input: &[u8]) -> BytesMut {
    let mut out = BytesMut::with_capacity(input.len() + 8);
    let mut previous = 0u8;
    for &byte in input {
        match byte {
            IAC => out.put_slice(&[IAC, IAC]),
            b'\n' if previous != b'\r' => out.put_slice(b"\r\n"),
            _ => out.put_u8(byte),
        }
        previous = byte;
    }
    out
}

/// Telnet link to a device's VTY line.
pub struct TelnetTransport {
    host: String,
    stream: Option<TcpStream>,
    decoder: TelnetDecoder,
}

impl TelnetTransport {
    /// Open a TCP connection to `host:port`.
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
            .map_err(|source| TransportError::ConnectionFailed {
                host: host.to_string(),
                port,
                source,
            })?;

        stream.set_nodelay(true).map_err(TransportError::Io)?;
        debug!("telnet connected to {}:{}", host, port);

        Ok(Self {
            host: host.to_string(),
            stream: Some(stream),
            decoder: TelnetDecoder::new(),
        })
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected.into())
    }
}

#[async_trait]
impl Transport for TelnetTransport {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let encoded = encode(data);
        self.stream()?
            .write_all(&encoded)
            .await
            .map_err(TransportError::Io)?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            let n = self
                .stream()?
                .read(&mut buf)
                .await
                .map_err(TransportError::Io)?;
            if n == 0 {
                return Err(TransportError::Disconnected.into());
            }

            let mut data = BytesMut::with_capacity(n);
            let mut replies = BytesMut::new();
            self.decoder.decode(&buf[..n], &mut data, &mut replies);

            if !replies.is_empty() {
                trace!("{}: answering {} negotiation bytes", self.host, replies.len());
                self.stream()?
                    .write_all(&replies)
                    .await
                    .map_err(TransportError::Io)?;
            }

            // A chunk made only of negotiation carries nothing for the caller
            if !data.is_empty() {
                return Ok(data.to_vec());
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // Peer may already be gone; the socket is dropped either way
            let _ = stream.shutdown().await;
            debug!("telnet connection to {} closed", self.host);
        }
        Ok(())
    }
}
