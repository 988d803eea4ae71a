//! Socket primitive consumed by the connection engine.
//!
//! `StreamSocket` is the minimal non-blocking surface the engine needs from a
//! stream socket. Based on Chromium's `StreamSocket` interface, reduced to
//! readiness-driven calls: every method returns immediately and reports
//! `WouldBlock` when the operation cannot make progress.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};

/// A non-blocking, connection-oriented byte stream.
///
/// Chromium equivalent: `net::StreamSocket`
pub trait StreamSocket {
    /// Sends bytes, returning how many the kernel accepted.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Receives bytes. `Ok(0)` means the peer closed its side.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Returns and clears the pending socket error (`SO_ERROR`).
    fn take_error(&self) -> io::Result<Option<io::Error>>;

    /// Address of the connected peer; `NotConnected` while the handshake is
    /// still in flight.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    fn shutdown(&self, how: Shutdown) -> io::Result<()>;
}

impl StreamSocket for mio::net::TcpStream {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn take_error(&self) -> io::Result<Option<io::Error>> {
        mio::net::TcpStream::take_error(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        mio::net::TcpStream::peer_addr(self)
    }

    fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        mio::net::TcpStream::shutdown(self, how)
    }
}
