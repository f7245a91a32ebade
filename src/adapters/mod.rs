//! Command channels to the instrument.
//!
//! A [`DeviceChannel`] is the only way the driver talks to hardware. It offers
//! the three primitives every message-based instrument bus provides: write a
//! command, query (write then read one terminated line), and read raw bytes.
//!
//! Implementations are not required to be shareable. Exclusive, ordered
//! access is enforced one level up by the driver, which holds each channel
//! behind a mutex for the whole duration of a conversation.

use crate::error::AppResult;
use async_trait::async_trait;
use bytes::Bytes;

pub mod tcp_adapter;
pub use tcp_adapter::TcpChannel;

/// Message-based command channel to one instrument.
#[async_trait]
pub trait DeviceChannel: Send {
    /// Send a command without expecting a response.
    async fn write(&mut self, command: &str) -> AppResult<()>;

    /// Send a command and return its terminated, trimmed response.
    async fn query(&mut self, command: &str) -> AppResult<String>;

    /// Like [`query`](Self::query), but waits for the response without the
    /// channel's I/O timeout.
    ///
    /// Used for `*OPC?`, which the instrument holds back until the sweep
    /// group finishes.
    async fn query_unbounded(&mut self, command: &str) -> AppResult<String> {
        self.query(command).await
    }

    /// Read up to `max_bytes` raw bytes.
    ///
    /// May return fewer bytes than requested. Returns a channel error rather
    /// than an empty buffer when nothing arrives.
    async fn read(&mut self, max_bytes: usize) -> AppResult<Bytes>;

    /// Short human-readable description, used in logs.
    fn describe(&self) -> String;
}
