//! mqnet - MQTT v5 client network transport layer
//!
//! This crate provides the network modules an MQTT client connects through:
//! a plain TCP transport and a TLS transport that upgrades the TCP stream
//! into an encrypted, identity-checked channel.

pub mod transport;
