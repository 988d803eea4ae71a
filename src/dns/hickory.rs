//! DNS resolver using hickory-dns.
//!
//! This resolver provides DNS resolution with support for:
//! - DNS-over-HTTPS (DoH)
//! - DNS-over-TLS (DoT)
//! - System DNS configuration auto-detection
//!
//! hickory is async; the resolver owns a small tokio runtime and blocks on
//! it, which keeps it usable from the engine's resolver threads.

use super::{Name, Resolve};
use crate::base::neterror::NetError;
use hickory_resolver::{
    config::{LookupIpStrategy, ResolverConfig},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::net::IpAddr;
use tokio::runtime::{Builder, Runtime};

/// DNS resolver backed by hickory-dns.
///
/// # Example
///
/// ```rust,ignore
/// use evnet::dns::{HickoryResolver, Name, Resolve};
///
/// let resolver = HickoryResolver::new()?;
/// let ips = resolver.resolve(&Name::new("example.com"))?;
/// ```
pub struct HickoryResolver {
    runtime: Runtime,
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Creates a new `HickoryResolver`.
    ///
    /// It will attempt to read system DNS configuration; if that fails,
    /// it falls back to sensible defaults.
    pub fn new() -> Result<Self, NetError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("evnet-hickory")
            .enable_all()
            .build()
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to start hickory runtime");
                NetError::NameResolutionFailed
            })?;

        let resolver = {
            let _guard = runtime.enter();
            let mut builder = match TokioResolver::builder_tokio() {
                Ok(builder) => {
                    tracing::debug!("Using system DNS configuration");
                    builder
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Failed to read system DNS config, using defaults"
                    );
                    TokioResolver::builder_with_config(
                        ResolverConfig::default(),
                        TokioConnectionProvider::default(),
                    )
                }
            };

            // Ordering is applied by the engine's family preference
            builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
            builder.build()
        };

        Ok(Self { runtime, resolver })
    }
}

impl Resolve for HickoryResolver {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        let domain = name.as_str();
        tracing::debug!(domain = %domain, "resolving via hickory-dns");

        let lookup = self.runtime.block_on(self.resolver.lookup_ip(domain)).map_err(|e| {
            tracing::debug!(domain = %domain, error = %e, "hickory-dns lookup failed");
            NetError::NameNotResolved
        })?;

        let ips: Vec<IpAddr> = lookup.iter().collect();
        if ips.is_empty() {
            return Err(NetError::NameNotResolved);
        }

        tracing::debug!(domain = %domain, count = ips.len(), "hickory-dns resolution complete");
        Ok(ips)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        let lookup = self.runtime.block_on(self.resolver.reverse_lookup(ip)).map_err(|e| {
            tracing::debug!(ip = %ip, error = %e, "hickory-dns reverse lookup failed");
            NetError::NameNotResolved
        })?;

        let name = lookup.iter().next().map(|ptr| ptr.to_string()).ok_or(NetError::NameNotResolved)?;
        Ok(name.trim_end_matches('.').to_string())
    }
}

impl std::fmt::Debug for HickoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HickoryResolver").finish_non_exhaustive()
    }
}
