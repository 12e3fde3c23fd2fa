//! TLS network module
//!
//! Drives the upgrade of a TCP stream into a verified TLS channel. The
//! sequence and its failure handling are the heart of this crate: connect,
//! restrict ciphers, bound the handshake with a read-timeout override,
//! inject SNI, handshake, verify the peer identity, restore the timeout.

use super::params::TlsParameters;
use super::verifier::{HostnameVerifier, SessionInfo};
use crate::transport::tcp::TcpNetworkModule;
use crate::transport::{
    poll_fd, Error, NetworkModule, PollEvents, Result, DEFAULT_HANDSHAKE_TIMEOUT_SECS,
};
use openssl::ssl::{HandshakeError, Ssl, SslContext, SslStream};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

/// Connection lifecycle of a `TlsNetworkModule`
///
/// `start` walks the states in order; any step's failure moves to `Failed`
/// with the socket already closed. Both terminal states are final: a new
/// attempt means a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unstarted,
    TcpConnected,
    CiphersApplied,
    ParamsConfigured,
    HandshakeDone,
    Verified,
    Failed,
}

/// TLS transport for one connection attempt
///
/// The caller supplies the `SslContext` (trust store, protocol policy,
/// chain verification); the module adds the per-connection concerns:
/// cipher restriction, bounded handshake, SNI, endpoint identification,
/// and the pluggable hostname verifier.
pub struct TlsNetworkModule {
    ctx: SslContext,
    host: String,
    port: u16,
    tcp: TcpNetworkModule,
    enabled_ciphers: Option<Vec<String>>,
    handshake_timeout_secs: u32,
    verifier: Option<Arc<dyn HostnameVerifier>>,
    https_hostname_verification: bool,
    params: TlsParameters,
    state: State,
    stream: Option<SslStream<TcpStream>>,
    session: Option<SessionInfo>,
}

impl TlsNetworkModule {
    /// Create a module targeting `host:port`, drawing per-connection TLS
    /// handles from `ctx`. Engine-level endpoint identification defaults to
    /// enabled; the handshake timeout defaults to
    /// [`DEFAULT_HANDSHAKE_TIMEOUT_SECS`].
    pub fn new(ctx: SslContext, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let mut tcp = TcpNetworkModule::new(host.clone(), port);
        tcp.set_connect_timeout_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS);
        TlsNetworkModule {
            ctx,
            host,
            port,
            tcp,
            enabled_ciphers: None,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            verifier: None,
            https_hostname_verification: true,
            params: TlsParameters::new(),
            state: State::Unstarted,
            stream: None,
            session: None,
        }
    }

    /// The enabled cipher suites, if restricted
    pub fn enabled_ciphers(&self) -> Option<&[String]> {
        self.enabled_ciphers.as_deref()
    }

    /// Restrict the handshake to the given OpenSSL cipher suite names.
    /// `None` keeps the engine defaults. Re-setting the same list is
    /// idempotent; changes after `start` do not affect an established
    /// session.
    pub fn set_enabled_ciphers(&mut self, ciphers: Option<Vec<String>>) {
        self.enabled_ciphers = ciphers;
    }

    /// The handshake timeout in seconds (0 = no explicit bound)
    pub fn handshake_timeout_secs(&self) -> u32 {
        self.handshake_timeout_secs
    }

    /// Bound the handshake to `secs` seconds, and the TCP connect with it.
    ///
    /// Zero means "no explicit bound" (the handshake runs under whatever
    /// read timeout the socket already has), never "fail immediately".
    pub fn set_handshake_timeout_secs(&mut self, secs: u32) {
        self.handshake_timeout_secs = secs;
        self.tcp.set_connect_timeout_secs(secs);
    }

    /// Install or clear the post-handshake hostname verifier
    pub fn set_hostname_verifier(&mut self, verifier: Option<Arc<dyn HostnameVerifier>>) {
        self.verifier = verifier;
    }

    /// Whether a hostname verifier is installed
    pub fn has_hostname_verifier(&self) -> bool {
        self.verifier.is_some()
    }

    /// Whether engine-level endpoint identification is requested
    pub fn https_hostname_verification_enabled(&self) -> bool {
        self.https_hostname_verification
    }

    /// Enable/disable the engine's built-in HTTPS-style endpoint
    /// identification during the handshake. Independent of the pluggable
    /// verifier; on by default.
    pub fn set_https_hostname_verification_enabled(&mut self, enabled: bool) {
        self.https_hostname_verification = enabled;
    }

    /// The configured TLS parameters (pre-populated SNI names etc.)
    pub fn tls_parameters(&self) -> &TlsParameters {
        &self.params
    }

    /// Replace the configured TLS parameters. `start` works on a copy, so
    /// the set stored here is never mutated behind the caller's back; the
    /// target host is appended to the copy, never to this value.
    pub fn set_tls_parameters(&mut self, params: TlsParameters) {
        self.params = params;
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.state
    }

    /// Facts about the negotiated session, once `Verified`
    pub fn session_info(&self) -> Option<&SessionInfo> {
        self.session.as_ref()
    }

    /// Read timeout of the established channel
    pub fn read_timeout(&self) -> Result<Option<Duration>> {
        match self.stream {
            Some(ref s) => s.get_ref().read_timeout().map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }

    /// Set the read timeout of the established channel
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self.stream {
            Some(ref s) => s.get_ref().set_read_timeout(timeout).map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }

    /// Run the upgrade sequence. Every step is a commit point: a failure
    /// skips the remaining steps, closes the socket, and surfaces as the
    /// step's error class.
    fn upgrade(&mut self) -> Result<SslStream<TcpStream>> {
        // 1. Raw connection, delegated to the plain transport. Failures
        //    here are connection errors, untouched by TLS wrapping.
        self.tcp.start()?;
        let tcp = self.tcp.take_stream().ok_or(Error::NotConnected)?;
        self.state = State::TcpConnected;

        let mut ssl = Ssl::new(&self.ctx)?;

        // 2. Cipher restriction. Re-applied as part of the parameter set in
        //    step 4 as well; application is idempotent.
        let cipher_list = self.enabled_ciphers.as_ref().map(|c| c.join(":"));
        if let Some(ref ciphers) = cipher_list {
            ssl.set_cipher_list(ciphers)?;
        }
        self.state = State::CiphersApplied;

        // 3. Bound the handshake. A plain connect succeeding says nothing
        //    about how long the peer may stall the negotiation, so the
        //    configured timeout overrides the ambient read timeout until
        //    the handshake is done. Zero leaves the ambient timeout as-is.
        let saved_timeout = tcp.read_timeout().map_err(Error::Io)?;
        if self.handshake_timeout_secs > 0 {
            tcp.set_read_timeout(Some(Duration::from_secs(u64::from(
                self.handshake_timeout_secs,
            ))))
            .map_err(Error::Io)?;
        }

        // 4. SNI and endpoint identification, applied as one parameter set.
        //    The target host joins any pre-configured server names.
        let mut params = self.params.clone();
        params.set_cipher_list(cipher_list);
        params.push_server_name(self.host.clone());
        if self.https_hostname_verification {
            params.set_endpoint_identification(true);
        }
        params.apply_to(&mut ssl)?;
        self.state = State::ParamsConfigured;

        // 5. Handshake. The timeout from step 3 is still active, so a
        //    stalled peer surfaces as a bounded failure, not a hang.
        let stream = ssl.connect(tcp).map_err(|e| {
            match e {
                HandshakeError::Failure(ref mid) | HandshakeError::WouldBlock(ref mid) => {
                    let _ = mid.get_ref().shutdown(Shutdown::Both);
                }
                // The stream was consumed and dropped with the error
                HandshakeError::SetupFailure(_) => {}
            }
            Error::Handshake(e.to_string())
        })?;
        self.state = State::HandshakeDone;

        // 6. Pluggable identity check. The chain was already trusted by the
        //    engine; a rejection here is a distinct error class carrying
        //    both the expected and the peer-reported host. No close_notify
        //    is sent, so the rejected session is not cleanly resumable.
        let session = SessionInfo::from_ssl(stream.ssl());
        if let Some(ref verifier) = self.verifier {
            if !verifier.verify(&self.host, &session) {
                let _ = stream.get_ref().shutdown(Shutdown::Both);
                return Err(Error::PeerUnverified {
                    expected: self.host.clone(),
                    peer: session.peer_host().unwrap_or("unknown").to_string(),
                });
            }
        }
        self.session = Some(session);

        // 7. Hand the channel back with the caller's ambient read timeout.
        stream.get_ref().set_read_timeout(saved_timeout).map_err(Error::Io)?;
        Ok(stream)
    }
}

impl NetworkModule for TlsNetworkModule {
    fn start(&mut self) -> Result<()> {
        if self.state != State::Unstarted {
            return Err(Error::AlreadyStarted);
        }
        match self.upgrade() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state = State::Verified;
                Ok(())
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // close_notify first, then tear down the transport
            let _ = stream.shutdown();
            stream
                .get_ref()
                .shutdown(Shutdown::Both)
                .map_err(Error::Io)?;
        }
        Ok(())
    }

    fn server_uri(&self) -> String {
        format!("ssl://{}:{}", self.host, self.port)
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        let stream = match self.stream {
            Some(ref s) => s,
            None => return Err(Error::NotConnected),
        };

        // Decrypted bytes already buffered in the engine count as readable
        if events == PollEvents::Read || events == PollEvents::Both {
            if stream.ssl().pending() > 0 {
                return Ok(true);
            }
        }

        poll_fd(stream.get_ref().as_raw_fd(), events, timeout)
    }
}

impl Read for TlsNetworkModule {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream {
            Some(ref mut s) => s.read(buf),
            None => Err(not_connected()),
        }
    }
}

impl Write for TlsNetworkModule {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream {
            Some(ref mut s) => s.write(buf),
            None => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream {
            Some(ref mut s) => s.flush(),
            None => Err(not_connected()),
        }
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "network module not started")
}
