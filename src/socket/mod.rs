//! Socket-level building blocks of a connection.
//!
//! Mirrors the split of Chromium's `net/socket/`:
//! - [`stream`]: the non-blocking socket primitive
//! - [`connectjob`]: candidate walk for the connect phase
//! - [`writequeue`]: FIFO of outbound buffers with ownership tags
//! - [`framing`]: inbound buffering for the read modes

pub(crate) mod connectjob;
pub mod framing;
pub mod stream;
pub mod writequeue;

pub use framing::ReadMode;
pub use stream::StreamSocket;
pub use writequeue::{Lease, Release, WriteBuf};
