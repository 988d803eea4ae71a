//! DNS Resolution Module
//!
//! Provides pluggable DNS resolution with support for:
//! - System resolver (getaddrinfo / getnameinfo)
//! - hickory-dns resolver (DoH/DoT capable)
//! - Hostname-to-IP override mechanism
//! - Address-family ordering of the resulting candidates
//!
//! # Architecture
//!
//! This module mirrors Chromium's `HostResolver` concept. The `Resolve` trait
//! is a blocking contract; the engine turns it into a non-blocking one by
//! running lookups on background threads and handing results back to the
//! loop thread before any callback fires.
//!
//! # Example
//!
//! ```rust,ignore
//! use evnet::dns::{lookup, AddressFamily, GaiResolver, Name};
//!
//! let addrs = lookup(&GaiResolver::new(), &Name::new("example.com"), AddressFamily::default())?;
//! for addr in addrs {
//!     println!("Resolved: {}", addr);
//! }
//! ```

mod gai;
#[cfg(feature = "hickory")]
mod hickory;
pub(crate) mod pool;
mod resolve;

pub use gai::GaiResolver;
#[cfg(feature = "hickory")]
pub use hickory::HickoryResolver;
pub use resolve::{lookup, Address, AddressFamily, DnsResolverWithOverrides, Name, Resolve};
