//! Inbound buffering and record extraction for the read modes.

use super::stream::StreamSocket;
use crate::base::neterror::NetError;
use bytes::{Bytes, BytesMut};
use std::io;

/// How the next `read()` call consumes the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadMode {
    /// Deliver whatever bytes are available, as one chunk.
    Chunk,
    /// Deliver one `\n`-terminated record, terminator stripped.
    Line,
    /// Deliver one record terminated by the given byte, terminator stripped.
    Delimited(u8),
    /// Report readability without consuming anything.
    Notify,
}

impl ReadMode {
    fn delimiter(self) -> Option<u8> {
        match self {
            ReadMode::Line => Some(b'\n'),
            ReadMode::Delimited(delim) => Some(delim),
            ReadMode::Chunk | ReadMode::Notify => None,
        }
    }
}

/// Bytes received from the socket but not yet handed to the caller.
#[derive(Debug)]
pub(crate) struct ReadBuffer {
    buf: BytesMut,
    max_record: usize,
}

impl ReadBuffer {
    pub(crate) fn new(max_record: usize) -> Self {
        Self { buf: BytesMut::new(), max_record }
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Performs one `recv` of up to `chunk` bytes. `Ok(0)` is end of stream.
    pub(crate) fn fill<S: StreamSocket + ?Sized>(
        &mut self,
        socket: &mut S,
        chunk: usize,
    ) -> io::Result<usize> {
        let start = self.buf.len();
        self.buf.resize(start + chunk, 0);
        let result = socket.recv(&mut self.buf[start..]);
        let received = *result.as_ref().unwrap_or(&0);
        self.buf.truncate(start + received);
        result
    }

    /// Returns true if `take` would produce a record for `mode`.
    pub(crate) fn has_record(&self, mode: ReadMode) -> bool {
        match mode {
            ReadMode::Chunk => !self.buf.is_empty(),
            ReadMode::Notify => false,
            ReadMode::Line | ReadMode::Delimited(_) => {
                mode.delimiter().is_some_and(|delim| self.buf.contains(&delim))
            }
        }
    }

    /// Extracts the next record for `mode`, if one is complete.
    ///
    /// Fails with `MsgTooBig` once an unterminated record outgrows the limit.
    pub(crate) fn take(&mut self, mode: ReadMode) -> Result<Option<Bytes>, NetError> {
        match mode.delimiter() {
            None if mode == ReadMode::Chunk && !self.buf.is_empty() => {
                Ok(Some(self.buf.split().freeze()))
            }
            None => Ok(None),
            Some(delim) => match self.buf.iter().position(|&b| b == delim) {
                Some(pos) => {
                    let mut record = self.buf.split_to(pos + 1);
                    record.truncate(pos);
                    Ok(Some(record.freeze()))
                }
                None if self.buf.len() > self.max_record => Err(NetError::MsgTooBig),
                None => Ok(None),
            },
        }
    }

    /// Drains an unterminated tail, used when the peer closes mid-record.
    pub(crate) fn take_remainder(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.split().freeze())
        }
    }
}
