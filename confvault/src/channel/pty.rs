//! PTY channel abstraction for interactive sessions.

use std::time::Duration;

use bytes::Bytes;
use log::trace;
use regex::bytes::Regex;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};

use super::buffer::PatternBuffer;
use crate::error::ChannelError;

/// Interactive shell channel with prompt-driven reads.
pub struct PtyChannel {
    channel: Channel<Msg>,
    buffer: PatternBuffer,
}

impl PtyChannel {
    pub fn new(channel: Channel<Msg>, search_depth: usize) -> Self {
        Self {
            channel,
            buffer: PatternBuffer::new(search_depth),
        }
    }

    /// Send a line of input followed by a newline.
    pub async fn send(&mut self, input: &str) -> Result<(), ChannelError> {
        let line = format!("{}\n", input);
        self.channel.data(line.as_bytes()).await?;
        Ok(())
    }

    /// Read until `pattern` matches the tail of the accumulated output.
    ///
    /// Returns everything read since the previous match, prompt included.
    pub async fn read_until(
        &mut self,
        pattern: &Regex,
        timeout: Duration,
    ) -> Result<Bytes, ChannelError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.buffer.tail_contains(pattern) {
                return Ok(self.buffer.take());
            }

            let msg = tokio::time::timeout_at(deadline, self.channel.wait())
                .await
                .map_err(|_| ChannelError::PatternTimeout(timeout))?;

            match msg {
                Some(ChannelMsg::Data { ref data }) => {
                    trace!("pty read {} bytes", data.len());
                    self.buffer.extend(data);
                }
                Some(ChannelMsg::ExtendedData { ref data, .. }) => {
                    self.buffer.extend(data);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(ChannelError::Closed);
                }
                Some(_) => {}
            }
        }
    }

    /// Discard anything buffered but not yet consumed.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub async fn close(self) -> Result<(), ChannelError> {
        self.channel.eof().await?;
        self.channel.close().await?;
        Ok(())
    }
}
