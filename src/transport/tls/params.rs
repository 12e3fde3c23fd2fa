//! TLS connection parameters
//!
//! A value type for the per-connection settings that get pushed onto the
//! engine before the handshake: the SNI server-name list, endpoint
//! identification, and the cipher restriction. The module copies the
//! configured parameters out, amends the copy, and applies the combined set
//! in one place, so the engine's state is never mutated piecemeal across
//! steps.

use openssl::error::ErrorStack;
use openssl::ssl::SslRef;

/// Per-connection TLS parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsParameters {
    server_names: Vec<String>,
    endpoint_identification: bool,
    cipher_list: Option<String>,
}

impl TlsParameters {
    /// Create an empty parameter set: no server names, no endpoint
    /// identification, engine-default ciphers.
    pub fn new() -> Self {
        TlsParameters::default()
    }

    /// The ordered SNI server-name list
    pub fn server_names(&self) -> &[String] {
        &self.server_names
    }

    /// Append a server name, preserving existing entries. Appending a name
    /// already present is a no-op, so re-application is idempotent.
    pub fn push_server_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.server_names.iter().any(|n| *n == name) {
            self.server_names.push(name);
        }
    }

    /// Whether engine-level endpoint identification is requested
    pub fn endpoint_identification(&self) -> bool {
        self.endpoint_identification
    }

    /// Request the engine's built-in hostname check during chain
    /// verification, against the last server name in the list.
    pub fn set_endpoint_identification(&mut self, enabled: bool) {
        self.endpoint_identification = enabled;
    }

    /// The cipher restriction as an OpenSSL cipher-list string
    pub fn cipher_list(&self) -> Option<&str> {
        self.cipher_list.as_deref()
    }

    /// Restrict the handshake to the given OpenSSL cipher-list string
    /// (colon-separated). `None` keeps the engine defaults.
    pub fn set_cipher_list(&mut self, ciphers: Option<String>) {
        self.cipher_list = ciphers;
    }

    /// Apply the parameter set to a pre-handshake connection handle.
    ///
    /// The wire SNI extension carries a single host name, so the last entry
    /// of the list (the target host, appended by the module) is the one
    /// sent; the full list stays observable on the value type. Applying the
    /// same set twice is idempotent.
    pub fn apply_to(&self, ssl: &mut SslRef) -> Result<(), ErrorStack> {
        if let Some(ref ciphers) = self.cipher_list {
            ssl.set_cipher_list(ciphers)?;
        }
        if let Some(name) = self.server_names.last() {
            ssl.set_hostname(name)?;
            if self.endpoint_identification {
                ssl.param_mut().set_host(name)?;
            }
        }
        Ok(())
    }
}
