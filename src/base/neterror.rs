use std::io;
use thiserror::Error;

/// Network error codes, numbered after Chromium's `net_error_list.h`.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum NetError {
    // Generic Errors
    #[error("Invalid or stale connection handle")]
    InvalidHandle,
    #[error("Unexpected error")]
    Unexpected,
    #[error("Invalid argument")]
    InvalidArgument,
    #[error("Socket is already connected")]
    SocketIsConnected,

    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Internet disconnected")]
    InternetDisconnected,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("Address invalid")]
    AddressInvalid,
    #[error("Address unreachable")]
    AddressUnreachable,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Host resolver queue too large")]
    HostResolverQueueTooLarge,
    #[error("Name resolution failed")]
    NameResolutionFailed,
    #[error("Network access denied")]
    NetworkAccessDenied,
    #[error("Message too big")]
    MsgTooBig,
    #[error("Address in use")]
    AddressInUse,
    #[error("No buffer space")]
    NoBufferSpace,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

/// Coarse failure taxonomy used when reporting a failed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Lookup failed or the host is unknown.
    Resolution,
    /// Refused, unreachable or aborted while connecting.
    Connect,
    /// Mid-stream send/recv failure.
    Io,
    /// A deadline elapsed.
    Timeout,
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Unexpected => -9,
            NetError::InvalidHandle => -8,
            NetError::InvalidArgument => -4,
            NetError::SocketIsConnected => -23,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed => -104,
            NetError::NameNotResolved => -105,
            NetError::InternetDisconnected => -106,
            NetError::AddressInvalid => -108,
            NetError::AddressUnreachable => -109,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,
            NetError::HostResolverQueueTooLarge => -119,
            NetError::NameResolutionFailed => -137,
            NetError::NetworkAccessDenied => -138,
            NetError::MsgTooBig => -142,
            NetError::AddressInUse => -147,
            NetError::NoBufferSpace => -176,
            NetError::Unknown(code) => *code,
        }
    }

    /// Maps this error onto the connection failure taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            NetError::NameNotResolved
            | NetError::NameResolutionFailed
            | NetError::HostResolverQueueTooLarge => ErrorCategory::Resolution,
            NetError::ConnectionRefused
            | NetError::ConnectionFailed
            | NetError::ConnectionAborted
            | NetError::AddressUnreachable
            | NetError::AddressInvalid
            | NetError::AddressInUse
            | NetError::NetworkAccessDenied
            | NetError::InternetDisconnected => ErrorCategory::Connect,
            NetError::ConnectionTimedOut => ErrorCategory::Timeout,
            _ => ErrorCategory::Io,
        }
    }

    /// Translates an OS error raised while establishing a connection.
    pub fn from_connect_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::AddrInUse => NetError::AddressInUse,
            io::ErrorKind::AddrNotAvailable => NetError::AddressInvalid,
            io::ErrorKind::PermissionDenied => NetError::NetworkAccessDenied,
            _ => match err.raw_os_error() {
                Some(libc::EHOSTUNREACH) | Some(libc::ENETUNREACH) => NetError::AddressUnreachable,
                Some(libc::ENETDOWN) => NetError::InternetDisconnected,
                _ => NetError::ConnectionFailed,
            },
        }
    }

    /// Translates an OS error raised by send/recv on an established stream.
    pub fn from_transfer_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => NetError::ConnectionReset,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => NetError::ConnectionClosed,
            io::ErrorKind::OutOfMemory => NetError::NoBufferSpace,
            _ => match err.raw_os_error() {
                Some(code) => NetError::Unknown(-code.abs()),
                None => NetError::ConnectionFailed,
            },
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -9 => NetError::Unexpected,
            -8 => NetError::InvalidHandle,
            -4 => NetError::InvalidArgument,
            -23 => NetError::SocketIsConnected,
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -106 => NetError::InternetDisconnected,
            -108 => NetError::AddressInvalid,
            -109 => NetError::AddressUnreachable,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,
            -119 => NetError::HostResolverQueueTooLarge,
            -137 => NetError::NameResolutionFailed,
            -138 => NetError::NetworkAccessDenied,
            -142 => NetError::MsgTooBig,
            -147 => NetError::AddressInUse,
            -176 => NetError::NoBufferSpace,
            _ => NetError::Unknown(code),
        }
    }
}
