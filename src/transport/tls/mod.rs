//! TLS network module
//!
//! Upgrades an established TCP stream into a TLS-protected channel for the
//! MQTT client. The caller supplies a built `openssl::ssl::SslContext`
//! (trust store, protocol versions, chain verification policy); this module
//! owns everything connection-specific on top of it:
//!
//! 1. cipher suite restriction
//! 2. a bounded handshake (read-timeout override, restored afterward)
//! 3. additive SNI injection for the target host
//! 4. optional engine-level endpoint identification
//! 5. a pluggable post-handshake hostname verifier
//!
//! Failures are typed so callers can tell a refused connection from a failed
//! handshake from a trusted-but-wrong peer identity, and on every failure
//! path the socket is closed before the error is returned.
//!
//! # Examples
//!
//! ```no_run
//! use mqnet::transport::NetworkModule;
//! use mqnet::transport::tls::TlsNetworkModule;
//! use openssl::ssl::{SslContext, SslMethod};
//!
//! let ctx = SslContext::builder(SslMethod::tls_client()).unwrap().build();
//! let mut module = TlsNetworkModule::new(ctx, "broker.example.com", 8883);
//! module.set_handshake_timeout_secs(10);
//! module.start().unwrap();
//! ```

pub mod module;
pub mod params;
pub mod verifier;

pub use module::{State, TlsNetworkModule};
pub use params::TlsParameters;
pub use verifier::{HostnameVerifier, SessionInfo};
