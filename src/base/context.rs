//! Ergonomic error context helpers.
//!
//! Provides extension traits for converting IO errors into `NetError`
//! values, depending on which phase of a connection produced them.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Classify an IO error raised while establishing a connection.
    ///
    /// # Example
    /// ```ignore
    /// use evnet::base::context::IoResultExt;
    ///
    /// let socket = reactor.connect(addr).connect_context()?;
    /// // Error: "Connection refused"
    /// ```
    fn connect_context(self) -> Result<T, NetError>;

    /// Classify an IO error raised by send/recv on an established stream.
    fn transfer_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connect_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::from_connect_error(&e))
    }

    fn transfer_context(self) -> Result<T, NetError> {
        self.map_err(|e| NetError::from_transfer_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_connect_context() {
        let result: Result<(), io::Error> =
            Err(Error::new(ErrorKind::ConnectionRefused, "refused"));
        let err = result.connect_context().unwrap_err();
        assert_eq!(err, NetError::ConnectionRefused);
    }

    #[test]
    fn test_connect_context_unreachable() {
        let result: Result<(), io::Error> = Err(Error::from_raw_os_error(libc::EHOSTUNREACH));
        assert_eq!(result.connect_context().unwrap_err(), NetError::AddressUnreachable);
    }

    #[test]
    fn test_transfer_context() {
        let result: Result<(), io::Error> = Err(Error::new(ErrorKind::BrokenPipe, "pipe"));
        let err = result.transfer_context().unwrap_err();
        assert_eq!(err, NetError::ConnectionReset);
    }

    #[test]
    fn test_transfer_context_preserves_errno() {
        let result: Result<(), io::Error> = Err(Error::from_raw_os_error(libc::EIO));
        assert_eq!(result.transfer_context().unwrap_err(), NetError::Unknown(-libc::EIO));
    }
}
