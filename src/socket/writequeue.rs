//! Outbound buffer queue.
//!
//! Every `write()` call becomes exactly one [`WriteItem`]. Items are sent
//! strictly in submission order and never coalesced, so completion of an
//! item is completion of the call that produced it.
//!
//! Buffers come in two flavors:
//! - **copied**: the engine owns the bytes outright (`Bytes`).
//! - **lent**: the caller hands over a `Vec<u8>` together with a release
//!   hook. The hook gets the buffer back exactly once, either after the last
//!   byte was accepted by the socket or when the connection is torn down.

use super::stream::StreamSocket;
use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::mem;

/// Why a lent buffer was handed back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Every byte was accepted by the socket.
    Sent,
    /// The connection went away with bytes still unsent.
    Discarded,
}

type ReleaseHook = Box<dyn FnOnce(Vec<u8>, Release)>;

/// A caller-owned buffer on loan to the engine.
///
/// The hook is consumed on release; if the lease is dropped without an
/// explicit release it reports [`Release::Discarded`].
pub struct Lease {
    buf: Vec<u8>,
    hook: Option<ReleaseHook>,
}

impl Lease {
    fn release(mut self, why: Release) {
        if let Some(hook) = self.hook.take() {
            hook(mem::take(&mut self.buf), why);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook(mem::take(&mut self.buf), Release::Discarded);
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("len", &self.buf.len()).finish_non_exhaustive()
    }
}

/// A buffer submitted to [`Net::write`](crate::Net::write).
#[derive(Debug)]
pub enum WriteBuf {
    Copied(Bytes),
    Lent(Lease),
}

impl WriteBuf {
    /// Copies `data`; the caller may reuse its buffer immediately.
    pub fn copy(data: &[u8]) -> Self {
        WriteBuf::Copied(Bytes::copy_from_slice(data))
    }

    /// Lends `buf` to the engine. `hook` runs exactly once with the buffer.
    pub fn lend(buf: Vec<u8>, hook: impl FnOnce(Vec<u8>, Release) + 'static) -> Self {
        WriteBuf::Lent(Lease { buf, hook: Some(Box::new(hook)) })
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            WriteBuf::Copied(bytes) => bytes,
            WriteBuf::Lent(lease) => &lease.buf,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_lent(&self) -> bool {
        matches!(self, WriteBuf::Lent(_))
    }

    fn release(self, why: Release) {
        if let WriteBuf::Lent(lease) = self {
            lease.release(why);
        }
    }
}

impl From<Bytes> for WriteBuf {
    fn from(value: Bytes) -> Self {
        WriteBuf::Copied(value)
    }
}

impl From<Vec<u8>> for WriteBuf {
    fn from(value: Vec<u8>) -> Self {
        WriteBuf::Copied(Bytes::from(value))
    }
}

impl From<String> for WriteBuf {
    fn from(value: String) -> Self {
        WriteBuf::Copied(Bytes::from(value))
    }
}

impl From<&[u8]> for WriteBuf {
    fn from(value: &[u8]) -> Self {
        WriteBuf::copy(value)
    }
}

impl<const N: usize> From<&[u8; N]> for WriteBuf {
    fn from(value: &[u8; N]) -> Self {
        WriteBuf::copy(value)
    }
}

impl From<&str> for WriteBuf {
    fn from(value: &str) -> Self {
        WriteBuf::copy(value.as_bytes())
    }
}

/// One pending `write()` call.
#[derive(Debug)]
pub(crate) struct WriteItem {
    buf: WriteBuf,
    offset: usize,
    seq: u64,
}

impl WriteItem {
    fn remaining(&self) -> &[u8] {
        &self.buf.as_slice()[self.offset..]
    }

    fn is_done(&self) -> bool {
        self.offset >= self.buf.len()
    }
}

/// Result of one flush attempt.
#[derive(Debug, Default)]
pub(crate) struct Flush {
    /// Number of items (write calls) fully transmitted, in order.
    pub(crate) completed: usize,
    /// The socket stopped accepting bytes.
    pub(crate) blocked: bool,
    pub(crate) error: Option<io::Error>,
}

#[derive(Debug, Default)]
pub(crate) struct WriteQueue {
    items: VecDeque<WriteItem>,
    next_seq: u64,
    queued_bytes: usize,
}

impl WriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a buffer; returns the sequence number of the write call.
    pub(crate) fn push(&mut self, buf: WriteBuf) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queued_bytes += buf.len();
        self.items.push_back(WriteItem { buf, offset: 0, seq });
        seq
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Bytes accepted by `push` but not yet sent.
    pub(crate) fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    /// Sends as much as the socket accepts, head first.
    pub(crate) fn flush<S: StreamSocket + ?Sized>(&mut self, socket: &mut S) -> Flush {
        let mut flush = Flush::default();

        while let Some(head) = self.items.front_mut() {
            if !head.is_done() {
                match socket.send(head.remaining()) {
                    Ok(0) => {
                        flush.error = Some(io::ErrorKind::WriteZero.into());
                        break;
                    }
                    Ok(n) => {
                        head.offset += n;
                        self.queued_bytes -= n;
                        tracing::trace!(seq = head.seq, sent = n, "partial send");
                        if !head.is_done() {
                            continue;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        flush.blocked = true;
                        break;
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        flush.error = Some(e);
                        break;
                    }
                }
            }

            if let Some(item) = self.items.pop_front() {
                tracing::trace!(seq = item.seq, len = item.buf.len(), "write complete");
                item.buf.release(Release::Sent);
                flush.completed += 1;
            }
        }

        flush
    }

    /// Drops every pending item, handing lent buffers back as discarded.
    pub(crate) fn discard(&mut self) {
        self.queued_bytes = 0;
        for item in self.items.drain(..) {
            item.buf.release(Release::Discarded);
        }
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.discard();
    }
}
