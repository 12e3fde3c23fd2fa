//! Integration tests for the TLS network module
//!
//! These run the full upgrade sequence against a real OpenSSL server on the
//! loopback interface: handshake, cipher negotiation, SNI, hostname
//! verification, and timeout behavior.

mod common;

use mqnet::transport::tls::{SessionInfo, State, TlsNetworkModule};
use mqnet::transport::{Error, NetworkModule, PollEvents};
use openssl::ssl::{NameType, Ssl};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_handshake_and_echo_without_verifier() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();

        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"Hello");
        stream.write_all(b"World").unwrap();
    });

    // No verifier configured: an engine-accepted handshake is enough,
    // whatever hostname the peer certificate carries
    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.start().unwrap();
    assert_eq!(module.state(), State::Verified);

    module.write_all(b"Hello").unwrap();
    assert!(module
        .poll(PollEvents::Read, Some(Duration::from_secs(5)))
        .unwrap());
    let mut buf = [0u8; 5];
    module.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"World");

    module.stop().unwrap();
    server.join().unwrap();
}

#[test]
fn test_read_timeout_restored_after_handshake() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.set_handshake_timeout_secs(5);
    module.start().unwrap();

    // The handshake ran under a 5s read timeout; the channel handed back
    // must carry the ambient (unset) timeout again
    assert_eq!(module.read_timeout().unwrap(), None);

    module.stop().unwrap();
    server.join().unwrap();
}

#[test]
fn test_handshake_is_bounded_when_peer_stalls() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    // Accept the TCP connection and then never speak TLS
    let server = thread::spawn(move || {
        let (mut tcp, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1024];
        while let Ok(n) = tcp.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.set_handshake_timeout_secs(1);

    let started = Instant::now();
    let err = module.start().unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Handshake(_)));
    assert_eq!(module.state(), State::Failed);
    // 1s configured, generous slack for slow machines
    assert!(elapsed < Duration::from_secs(8), "took {:?}", elapsed);

    server.join().unwrap();
}

#[test]
fn test_verifier_rejection_is_peer_identity_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        // The client tears the connection down right after the handshake
        if let Ok(mut stream) = ssl.accept(tcp) {
            let mut buf = [0u8; 1];
            let _ = stream.read(&mut buf);
        }
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.set_hostname_verifier(Some(Arc::new(|_: &str, _: &SessionInfo| false)));

    let err = module.start().unwrap_err();
    match err {
        Error::PeerUnverified { expected, peer } => {
            assert_eq!(expected, "127.0.0.1");
            // Peer host comes from the test certificate's SAN
            assert_eq!(peer, "example.com");
        }
        other => panic!("expected PeerUnverified, got {:?}", other),
    }
    assert_eq!(module.state(), State::Failed);

    // No partially-open channel: the socket is gone
    let mut buf = [0u8; 1];
    assert!(module.read(&mut buf).is_err());
    assert!(module.write(b"x").is_err());

    server.join().unwrap();
}

#[test]
fn test_verifier_acceptance_sees_session_facts() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.set_hostname_verifier(Some(Arc::new(|_: &str, session: &SessionInfo| {
        session.peer_host() == Some("example.com")
    })));

    module.start().unwrap();
    let session = module.session_info().unwrap();
    assert_eq!(session.peer_host(), Some("example.com"));
    assert!(session.cipher().is_some());
    assert!(session.protocol().starts_with("TLS"));

    module.stop().unwrap();
    server.join().unwrap();
}

#[test]
fn test_cipher_restriction_negotiates_from_list() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let mut module = TlsNetworkModule::new(common::client_ctx_tls12(), "127.0.0.1", port);
    let ciphers = vec!["ECDHE-RSA-AES128-GCM-SHA256".to_string()];
    // Setting the same list twice must be harmless
    module.set_enabled_ciphers(Some(ciphers.clone()));
    module.set_enabled_ciphers(Some(ciphers));
    module.start().unwrap();

    let session = module.session_info().unwrap();
    assert_eq!(session.cipher(), Some("ECDHE-RSA-AES128-GCM-SHA256"));
    assert_eq!(session.protocol(), "TLSv1.2");

    module.stop().unwrap();
    server.join().unwrap();
}

#[test]
fn test_sni_reaches_the_server() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let seen: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let seen_server = Arc::clone(&seen);

    let mut builder = common::server_ctx_builder();
    builder.set_servername_callback(move |ssl, _alert| {
        *seen_server.lock().unwrap() = ssl
            .servername(NameType::HOST_NAME)
            .map(|s| s.to_string());
        Ok(())
    });
    let server_ctx = builder.build();

    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "localhost", port);
    module.start().unwrap();
    module.stop().unwrap();
    server.join().unwrap();

    assert_eq!(seen.lock().unwrap().as_deref(), Some("localhost"));
}

#[test]
fn test_second_start_after_success_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server_ctx = common::server_ctx();
    let server = thread::spawn(move || {
        let (tcp, _) = listener.accept().unwrap();
        let ssl = Ssl::new(&server_ctx).unwrap();
        let mut stream = ssl.accept(tcp).unwrap();
        let mut buf = [0u8; 1];
        let _ = stream.read(&mut buf);
    });

    let mut module = TlsNetworkModule::new(common::client_ctx(), "127.0.0.1", port);
    module.start().unwrap();
    assert!(matches!(module.start(), Err(Error::AlreadyStarted)));
    assert_eq!(module.state(), State::Verified);

    module.stop().unwrap();
    server.join().unwrap();
}
