//! Plain TCP network module
//!
//! Connects a raw TCP stream to the broker. This is both a transport in its
//! own right (plain `tcp://` connections) and the connection step the TLS
//! module delegates to before upgrading the stream.

use super::{poll_fd, Error, NetworkModule, PollEvents, Result, DEFAULT_CONNECT_TIMEOUT_SECS};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Plain TCP transport for one connection attempt
pub struct TcpNetworkModule {
    host: String,
    port: u16,
    connect_timeout_secs: u32,
    stream: Option<TcpStream>,
    started: bool,
}

impl TcpNetworkModule {
    /// Create a module targeting `host:port`. Nothing is connected until
    /// `start` is called.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpNetworkModule {
            host: host.into(),
            port,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            stream: None,
            started: false,
        }
    }

    /// Get the connect timeout in seconds (0 = no explicit bound)
    pub fn connect_timeout_secs(&self) -> u32 {
        self.connect_timeout_secs
    }

    /// Set the connect timeout in seconds. Zero disables the bound rather
    /// than failing immediately.
    pub fn set_connect_timeout_secs(&mut self, secs: u32) {
        self.connect_timeout_secs = secs;
    }

    /// Get the read timeout of the connected stream
    pub fn read_timeout(&self) -> Result<Option<Duration>> {
        match self.stream {
            Some(ref s) => s.read_timeout().map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }

    /// Set the read timeout of the connected stream
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match self.stream {
            Some(ref s) => s.set_read_timeout(timeout).map_err(Error::Io),
            None => Err(Error::NotConnected),
        }
    }

    /// Take ownership of the connected stream, leaving the module empty.
    /// Used by the TLS module to upgrade the raw stream after delegating
    /// connection establishment here.
    pub(crate) fn take_stream(&mut self) -> Option<TcpStream> {
        self.stream.take()
    }
}

impl NetworkModule for TcpNetworkModule {
    fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::AlreadyStarted);
        }
        self.started = true;

        let stream = connect_stream(&self.host, self.port, self.connect_timeout_secs)
            .map_err(Error::Connection)?;
        stream.set_nodelay(true).map_err(Error::Connection)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.shutdown(Shutdown::Both).map_err(Error::Io)?;
        }
        Ok(())
    }

    fn server_uri(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        match self.stream {
            Some(ref s) => poll_fd(s.as_raw_fd(), events, timeout),
            None => Err(Error::NotConnected),
        }
    }
}

impl Read for TcpNetworkModule {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stream {
            Some(ref mut s) => s.read(buf),
            None => Err(not_connected()),
        }
    }
}

impl Write for TcpNetworkModule {
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

/// Resolve `host:port` and connect to the first address that accepts.
///
/// A non-zero timeout bounds each individual connect attempt; zero means
/// no explicit bound.
pub(crate) fn connect_stream(host: &str, port: u16, timeout_secs: u32) -> io::Result<TcpStream> {
    let addrs = (host, port).to_socket_addrs()?;
    let mut last_err = None;

    for addr in addrs {
        let attempt = if timeout_secs > 0 {
            TcpStream::connect_timeout(&addr, Duration::from_secs(u64::from(timeout_secs)))
        } else {
            TcpStream::connect(addr)
        };
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "hostname resolved to no addresses")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_tcp_connect_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(b"Hello").unwrap();
        });

        let mut module = TcpNetworkModule::new("127.0.0.1", addr.port());
        module.start().unwrap();

        assert!(module
            .poll(PollEvents::Read, Some(Duration::from_secs(1)))
            .unwrap());

        let mut buf = [0u8; 5];
        module.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"Hello");

        module.stop().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_connection_refused_is_connection_error() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut module = TcpNetworkModule::new("127.0.0.1", port);
        let err = module.start().unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_single_shot() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut module = TcpNetworkModule::new("127.0.0.1", port);
        assert!(module.start().is_err());
        assert!(matches!(module.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_server_uri() {
        let module = TcpNetworkModule::new("broker.example.com", 1883);
        assert_eq!(module.server_uri(), "tcp://broker.example.com:1883");
    }

    #[test]
    fn test_io_before_start() {
        let mut module = TcpNetworkModule::new("127.0.0.1", 1883);
        let mut buf = [0u8; 1];
        assert_eq!(
            module.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
        assert!(matches!(module.read_timeout(), Err(Error::NotConnected)));
    }
}
