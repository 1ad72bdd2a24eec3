//! Interactive channel over a device link.

use std::time::Duration;

use log::{debug, trace};
use regex::bytes::Regex;
use tokio::time::{Instant, timeout_at};

use super::buffer::PatternBuffer;
use super::patterns::first_match;
use crate::error::{ChannelError, Error, Result, TransportError};
use crate::transport::Transport;

/// Default number of trailing bytes searched for prompts.
const SEARCH_DEPTH: usize = 1000;

/// Output collected by a timed read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedRead {
    /// Everything received during the window.
    pub data: Vec<u8>,

    /// Whether the stop pattern was seen before the window closed.
    pub matched: bool,
}

impl TimedRead {
    /// Get the data as a string (lossy UTF-8).
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }
}

/// A device link with a pattern buffer in front of it.
///
/// Reads accumulate into the buffer until a pattern matches at the tail.
/// Bytes after the match stay buffered for the next read.
pub struct DeviceChannel {
    transport: Box<dyn Transport>,
    buffer: PatternBuffer,
    open: bool,
}

impl DeviceChannel {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self::with_search_depth(transport, SEARCH_DEPTH)
    }

    pub fn with_search_depth(transport: Box<dyn Transport>, search_depth: usize) -> Self {
        Self {
            transport,
            buffer: PatternBuffer::new(search_depth),
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Send one line of input, terminated with a newline.
    ///
    /// Anything still buffered from earlier output is discarded first so a
    /// stale prompt cannot satisfy the next read.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        trace!("send: {:?}", line);
        self.write_line(line).await
    }

    /// Like [`send`](Self::send), but the input never reaches the log.
    pub async fn send_hidden(&mut self, line: &str) -> Result<()> {
        trace!("send: ********");
        self.write_line(line).await
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_raw(&data).await
    }

    /// Write bytes unchanged.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TransportError::Disconnected.into());
        }
        self.buffer.clear();
        self.transport.write(data).await
    }

    /// Read until `pattern` matches the tail of the output.
    ///
    /// Returns everything up to and including the match.
    pub async fn read_until_pattern(&mut self, pattern: &Regex, timeout: Duration) -> Result<Vec<u8>> {
        let (_, data) = self.read_until_any(&[pattern], timeout).await?;
        Ok(data)
    }

    /// Read until any of `patterns` matches; earlier patterns win ties.
    ///
    /// Returns the index of the matching pattern and the output up to the
    /// end of the match.
    pub async fn read_until_any(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<(usize, Vec<u8>)> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((index, end)) = self.find_in_tail(patterns) {
                let data = self.buffer.split_to(end);
                trace!("pattern {} matched after {} bytes", index, data.len());
                return Ok((index, data));
            }

            match timeout_at(deadline, self.transport.read()).await {
                Ok(Ok(chunk)) => self.buffer.extend(&chunk),
                Ok(Err(e)) => {
                    if is_disconnect(&e) {
                        self.open = false;
                    }
                    return Err(e);
                }
                Err(_) => {
                    debug!(
                        "no pattern after {:?}; tail: {:?}",
                        timeout,
                        String::from_utf8_lossy(self.buffer.as_slice())
                    );
                    return Err(ChannelError::PatternTimeout(timeout).into());
                }
            }
        }
    }

    /// Collect output for up to `window`, stopping early once `stop`
    /// matches. A timed read never fails on silence; a link that drops
    /// during the window ends it.
    pub async fn read_for(&mut self, window: Duration, stop: Option<&Regex>) -> Result<TimedRead> {
        let deadline = Instant::now() + window;
        loop {
            if let Some(pattern) = stop {
                if self.buffer.contains(pattern) {
                    return Ok(TimedRead {
                        data: self.buffer.take(),
                        matched: true,
                    });
                }
            }

            match timeout_at(deadline, self.transport.read()).await {
                Ok(Ok(chunk)) => self.buffer.extend(&chunk),
                Ok(Err(e)) if is_disconnect(&e) => {
                    debug!("link closed during timed read");
                    self.open = false;
                    break;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        Ok(TimedRead {
            data: self.buffer.take(),
            matched: false,
        })
    }

    /// Close the link. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.buffer.clear();
        self.transport.close().await
    }

    fn find_in_tail(&self, patterns: &[&Regex]) -> Option<(usize, usize)> {
        let (offset, tail) = self.buffer.tail();
        first_match(patterns, tail).map(|(index, m)| (index, offset + m.end()))
    }
}

fn is_disconnect(error: &Error) -> bool {
    matches!(error, Error::Transport(TransportError::Disconnected))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;

    use super::*;

    /// Replays scripted chunks, then pends forever (or reports a hangup).
    struct Scripted {
        chunks: VecDeque<Vec<u8>>,
        hang_up: bool,
        written: Vec<u8>,
    }

    impl Scripted {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                hang_up: false,
                written: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn write(&mut self, data: &[u8]) -> Result<()> {
            self.written.extend_from_slice(data);
            Ok(())
        }

        async fn read(&mut self) -> Result<Vec<u8>> {
            match self.chunks.pop_front() {
                Some(chunk) => Ok(chunk),
                None if self.hang_up => Err(TransportError::Disconnected.into()),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn prompt() -> Regex {
        Regex::new(r"R1#\s*$").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_until_prompt_across_chunks() {
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[
            b"show clock\r\n",
            b"*10:00 UTC\r\nR",
            b"1#",
        ])));
        let data = channel
            .read_until_pattern(&prompt(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(data, b"show clock\r\n*10:00 UTC\r\nR1#");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_until_any_reports_index() {
        let username = Regex::new(r"Username:\s*$").unwrap();
        let password = Regex::new(r"Password:\s*$").unwrap();
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[b"\r\nPassword: "])));
        let (index, _) = channel
            .read_until_any(&[&username, &password], Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pattern_timeout() {
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[b"partial output"])));
        let err = channel
            .read_until_pattern(&prompt(), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Channel(ChannelError::PatternTimeout(d)) if d == Duration::from_secs(3)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_closes_channel() {
        let mut scripted = Scripted::new(&[b"R1"]);
        scripted.hang_up = true;
        let mut channel = DeviceChannel::new(Box::new(scripted));
        let err = channel
            .read_until_pattern(&prompt(), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(is_disconnect(&err));
        assert!(!channel.is_open());
        assert!(channel.send("show clock").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_read_stops_early_on_match() {
        let confirm = Regex::new(r"\[confirm\]").unwrap();
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[
            b"write erase\r\n",
            b"Erasing the nvram filesystem. Continue? [confirm]",
        ])));
        let read = channel
            .read_for(Duration::from_secs(10), Some(&confirm))
            .await
            .unwrap();
        assert!(read.matched);
        assert!(read.as_str().contains("Erasing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_read_without_match_returns_collected_output() {
        let confirm = Regex::new(r"\[confirm\]").unwrap();
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[b"R1#"])));
        let start = Instant::now();
        let read = channel
            .read_for(Duration::from_secs(4), Some(&confirm))
            .await
            .unwrap();
        assert!(!read.matched);
        assert_eq!(read.data, b"R1#");
        assert!(start.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_output_stays_buffered() {
        let mut channel = DeviceChannel::new(Box::new(Scripted::new(&[b"Username: extra"])));
        let username = Regex::new(r"Username:").unwrap();
        let data = channel
            .read_until_pattern(&username, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(data, b"Username:");
        assert_eq!(channel.buffer.as_slice(), b" extra");
    }
}
