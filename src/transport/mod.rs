//! Network transport modules
//!
//! This module provides the transports an MQTT client connects through.
//! Each transport is a "network module": it owns the socket lifecycle for
//! one connection attempt and exposes byte-stream I/O once started.
//!
//! # Architecture
//!
//! - `NetworkModule` is the seam between the client and its transports
//! - `TcpNetworkModule` connects a plain TCP stream
//! - `tls::TlsNetworkModule` connects TCP, then upgrades the stream to TLS
//!   with a bounded handshake and identity verification
//!
//! A module instance covers exactly one connection attempt: `start` is
//! single-shot, and a failed instance is replaced, not retried.

pub mod tcp;
pub mod tls;

pub use tcp::TcpNetworkModule;
pub use tls::TlsNetworkModule;

use std::io::{Read, Write};
use std::os::fd::RawFd;
use std::time::Duration;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
///
/// The variants distinguish the failure classes a caller needs to apply
/// different retry policy to: a refused TCP connection, a failed or timed-out
/// TLS handshake, and a peer whose identity was rejected after a handshake
/// the engine itself accepted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(#[source] std::io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("peer identity rejected: expected host '{expected}', peer host '{peer}'")]
    PeerUnverified { expected: String, peer: String },

    #[error("network module already started")]
    AlreadyStarted,

    #[error("network module not connected")]
    NotConnected,

    #[error("TLS engine error: {0}")]
    Tls(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A client-side network transport for one connection attempt
///
/// Implementations own the socket from `start` until `stop` (or failure,
/// which closes it before the error is returned). Byte-stream I/O goes
/// through the `Read`/`Write` supertraits once `start` has succeeded.
pub trait NetworkModule: Read + Write {
    /// Open the connection. Single-shot: a second call on the same instance
    /// returns `Error::AlreadyStarted` whether the first attempt succeeded
    /// or failed.
    fn start(&mut self) -> Result<()>;

    /// Close the connection, releasing the socket.
    fn stop(&mut self) -> Result<()>;

    /// Canonical URI for the configured endpoint, e.g. `tcp://host:port`.
    /// Valid in any state, including before `start`.
    fn server_uri(&self) -> String;

    /// Wait until the transport is ready for the requested operation.
    ///
    /// Returns true if ready, false if the timeout elapsed first.
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

/// Poll a raw file descriptor for readiness
pub(crate) fn poll_fd(fd: RawFd, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
    use libc::{poll, pollfd, POLLIN, POLLOUT};

    let mut pfd = pollfd {
        fd,
        events: match events {
            PollEvents::Read => POLLIN,
            PollEvents::Write => POLLOUT,
            PollEvents::Both => POLLIN | POLLOUT,
        },
        revents: 0,
    };

    let timeout_ms = timeout
        .map(|d| d.as_millis() as i32)
        .unwrap_or(-1); // -1 = infinite

    let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

    if result < 0 {
        return Err(Error::Io(std::io::Error::last_os_error()));
    }

    Ok(result > 0)
}

/// Default MQTT port for plain TCP connections
pub const DEFAULT_TCP_PORT: u16 = 1883;

/// Default MQTT port for TLS connections
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Default TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 30;

/// Default TLS handshake timeout in seconds
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u32 = 30;
