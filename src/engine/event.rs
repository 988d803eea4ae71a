use crate::base::neterror::NetError;
use bytes::Bytes;

/// Everything a connection reports to its callback.
///
/// `Close`, `Timeout` and `Error` are terminal: exactly one of them is
/// delivered per connection and nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The handshake completed.
    Connect,
    /// One chunk or record, as selected by the read mode.
    Read(Bytes),
    /// One `write()` call was fully transmitted.
    Write,
    /// The socket has data; nothing was consumed.
    Readable,
    /// The write queue is empty and the socket accepts more bytes.
    Writable,
    /// The peer closed the stream.
    Close,
    /// The connection timer fired.
    Timeout,
    /// Resolution, connect or transfer failed.
    Error(NetError),
}

impl Event {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Close | Event::Timeout | Event::Error(_))
    }
}
