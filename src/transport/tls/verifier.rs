//! Post-handshake hostname verification
//!
//! The engine validates the certificate chain; a `HostnameVerifier` decides,
//! after the handshake, whether the peer the chain describes is the peer the
//! client meant to reach. It is a capability the caller supplies, kept
//! separate from handshake failures so a trusted-but-wrong identity is
//! reported as its own error class.

use openssl::nid::Nid;
use openssl::ssl::SslRef;
use openssl::x509::X509Ref;

/// Decides whether a completed TLS session matches the intended hostname
///
/// Implemented automatically for closures:
///
/// ```
/// use mqnet::transport::tls::{HostnameVerifier, SessionInfo};
///
/// let verifier = |host: &str, session: &SessionInfo| {
///     session.peer_host() == Some(host)
/// };
/// let session = SessionInfo::new(Some("a.example.com".into()), None, "TLSv1.3".into());
/// assert!(verifier.verify("a.example.com", &session));
/// ```
pub trait HostnameVerifier: Send + Sync {
    /// Return true to accept the peer, false to reject it. Rejection closes
    /// the connection before the error reaches the caller.
    fn verify(&self, hostname: &str, session: &SessionInfo) -> bool;
}

impl<F> HostnameVerifier for F
where
    F: Fn(&str, &SessionInfo) -> bool + Send + Sync,
{
    fn verify(&self, hostname: &str, session: &SessionInfo) -> bool {
        self(hostname, session)
    }
}

/// Identity and negotiation facts of a completed TLS session
///
/// Plain data extracted from the engine after the handshake, so verifiers
/// and diagnostics never hold an engine handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    peer_host: Option<String>,
    cipher: Option<String>,
    protocol: String,
}

impl SessionInfo {
    /// Build a session description directly. Mainly useful for testing
    /// verifier implementations without a live handshake.
    pub fn new(peer_host: Option<String>, cipher: Option<String>, protocol: String) -> Self {
        SessionInfo {
            peer_host,
            cipher,
            protocol,
        }
    }

    /// Extract session facts from a completed handshake
    pub(crate) fn from_ssl(ssl: &SslRef) -> Self {
        SessionInfo {
            peer_host: ssl
                .peer_certificate()
                .as_deref()
                .and_then(peer_host_from_cert),
            cipher: ssl.current_cipher().map(|c| c.name().to_string()),
            protocol: ssl.version_str().to_string(),
        }
    }

    /// Hostname the peer's leaf certificate claims: the first DNS subject
    /// alternative name, falling back to the subject common name.
    pub fn peer_host(&self) -> Option<&str> {
        self.peer_host.as_deref()
    }

    /// Negotiated cipher suite name
    pub fn cipher(&self) -> Option<&str> {
        self.cipher.as_deref()
    }

    /// Negotiated protocol version, e.g. "TLSv1.3"
    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

fn peer_host_from_cert(cert: &X509Ref) -> Option<String> {
    if let Some(names) = cert.subject_alt_names() {
        for name in &names {
            if let Some(dns) = name.dnsname() {
                return Some(dns.to_string());
            }
        }
    }
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|cn| cn.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}
