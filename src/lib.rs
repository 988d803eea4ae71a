//! # evnet
//!
//! An event-driven connection engine for Rust.
//!
//! `evnet` multiplexes hostname resolution, non-blocking TCP connect and
//! duplex stream I/O for many connections on a single thread. Each
//! connection reports everything through one callback that receives an
//! [`Event`].
//!
//! ## Features
//!
//! - **Async resolution**: blocking resolvers run on worker threads; results
//!   are handed back to the loop thread before any callback fires
//! - **Candidate policy**: first-candidate-only or sequential fail-over
//! - **Read modes**: raw chunks, `\n` lines, custom delimiters, or readiness
//!   notification only
//! - **Buffer ownership**: copied writes, or lent buffers returned through a
//!   single-use release hook
//! - **Timers**: one rearmable deadline per connection
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use evnet::{Event, Net, NetConfig, ReadMode};
//!
//! let mut net = Net::system(NetConfig::default())?;
//! net.open("example.com", 80, |net, id, event| match event {
//!     Event::Connect => {
//!         net.write(id, "HEAD / HTTP/1.0\r\n\r\n").ok();
//!         net.read(id, ReadMode::Line).ok();
//!     }
//!     Event::Read(line) => println!("{}", String::from_utf8_lossy(&line)),
//!     other => println!("{other:?}"),
//! })?;
//! net.run()?;
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error codes, error context and connection phases
//! - [`config`] - Engine configuration
//! - [`dns`] - Resolvers, address ordering and overrides
//! - [`engine`] - The connection state machine
//! - [`reactor`] - Event loop abstraction and the mio implementation
//! - [`socket`] - Socket primitive, write queue and read framing

pub mod base;
pub mod config;
pub mod dns;
pub mod engine;
pub mod reactor;
pub mod socket;

pub use base::loadstate::LoadState;
pub use base::neterror::{ErrorCategory, NetError};
pub use config::{CandidatePolicy, NetConfig, NetConfigBuilder};
pub use dns::{Address, AddressFamily, Resolve};
pub use engine::{Callback, ConnId, Event, LookupId, Net};
pub use reactor::{MioReactor, Reactor};
pub use socket::{ReadMode, Release, StreamSocket, WriteBuf};
