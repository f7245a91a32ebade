//! SCPI over a raw TCP socket.
//!
//! Most network analyzers expose a raw SCPI socket (port 5025). Commands are
//! newline terminated, query responses are single lines, and binary block
//! data is read back with [`DeviceChannel::read`].

use crate::adapters::DeviceChannel;
use crate::error::{AppResult, PnaError};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Async SCPI channel over TCP
pub struct TcpChannel {
    stream: BufReader<TcpStream>,
    timeout: Duration,
    peer: String,
}

impl TcpChannel {
    /// Connect to `host:port`.
    ///
    /// The connection attempt and every later operation are bounded by
    /// `io_timeout`.
    pub async fn connect(host: &str, port: u16, io_timeout: Duration) -> AppResult<Self> {
        let peer = format!("{}:{}", host, port);

        let stream = timeout(io_timeout, TcpStream::connect(peer.as_str()))
            .await
            .map_err(|_| PnaError::Channel(format!("Connection timeout to {}", peer)))?
            .map_err(|e| PnaError::Channel(format!("Failed to connect to {}: {}", peer, e)))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        tracing::info!(%peer, "Connected to instrument");

        Ok(Self {
            stream: BufReader::new(stream),
            timeout: io_timeout,
            peer,
        })
    }

    /// Set the per-operation timeout.
    pub fn set_timeout(&mut self, duration: Duration) {
        self.timeout = duration;
    }

    async fn send(&mut self, command: &str) -> AppResult<()> {
        let line = format!("{}\n", command);
        let stream = self.stream.get_mut();

        timeout(self.timeout, async {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| PnaError::Channel(format!("Timeout writing '{}'", command)))?
        .map_err(|e| PnaError::Channel(format!("Failed to write '{}': {}", command, e)))
    }

    async fn read_response(&mut self, command: &str, limit: Option<Duration>) -> AppResult<String> {
        let mut response = String::new();
        let read = match limit {
            Some(limit) => timeout(limit, self.stream.read_line(&mut response))
                .await
                .map_err(|_| {
                    PnaError::Channel(format!("Timeout waiting for response to '{}'", command))
                })?,
            None => self.stream.read_line(&mut response).await,
        };

        match read {
            Ok(0) => Err(PnaError::Channel(format!(
                "Connection closed by {} during '{}'",
                self.peer, command
            ))),
            Ok(_) => {
                let trimmed = response.trim().to_string();
                tracing::debug!(response = %trimmed, "SCPI response");
                Ok(trimmed)
            }
            Err(e) => Err(PnaError::Channel(format!(
                "Failed to read response to '{}': {}",
                command, e
            ))),
        }
    }
}

#[async_trait]
impl DeviceChannel for TcpChannel {
    async fn write(&mut self, command: &str) -> AppResult<()> {
        tracing::debug!(command, "SCPI write");
        self.send(command).await
    }

    async fn query(&mut self, command: &str) -> AppResult<String> {
        tracing::debug!(command, "SCPI query");
        self.send(command).await?;
        self.read_response(command, Some(self.timeout)).await
    }

    async fn query_unbounded(&mut self, command: &str) -> AppResult<String> {
        tracing::debug!(command, "SCPI query, no response timeout");
        self.send(command).await?;
        self.read_response(command, None).await
    }

    async fn read(&mut self, max_bytes: usize) -> AppResult<Bytes> {
        let mut buf = vec![0u8; max_bytes];
        let n = timeout(self.timeout, self.stream.read(&mut buf))
            .await
            .map_err(|_| PnaError::Channel(format!("Timeout reading {} bytes", max_bytes)))?
            .map_err(|e| PnaError::Channel(format!("Failed to read from {}: {}", self.peer, e)))?;

        if n == 0 && max_bytes > 0 {
            return Err(PnaError::Channel(format!(
                "Connection closed by {}",
                self.peer
            )));
        }

        buf.truncate(n);
        tracing::trace!(requested = max_bytes, received = n, "SCPI raw read");
        Ok(Bytes::from(buf))
    }

    fn describe(&self) -> String {
        format!("TcpChannel({} @ {}ms timeout)", self.peer, self.timeout.as_millis())
    }
}
