//! Core DNS resolution types and traits.
//!
//! This module defines the `Resolve` trait and supporting types that form
//! the foundation of the DNS abstraction layer.

use crate::base::neterror::NetError;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    net::{IpAddr, SocketAddr},
    sync::{Arc, OnceLock},
};

/// A domain name to resolve into IP addresses.
///
/// This is a lightweight wrapper around a hostname string that provides
/// a type-safe way to pass domain names to resolvers.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Arc<str>,
}

impl Name {
    /// Creates a new [`Name`] from any string-like type.
    #[inline]
    pub fn new(host: impl Into<Arc<str>>) -> Self {
        Self { host: host.into() }
    }

    /// View the hostname as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

/// Preferred ordering of IPv4 and IPv6 candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    /// IPv4 candidates first, then IPv6.
    #[default]
    Ipv4ThenIpv6,
    /// IPv6 candidates first, then IPv4.
    Ipv6ThenIpv4,
    /// Drop IPv6 candidates.
    Ipv4Only,
    /// Drop IPv4 candidates.
    Ipv6Only,
}

impl AddressFamily {
    /// Orders and filters `ips` according to this preference.
    ///
    /// Relative order within each family is preserved.
    pub fn apply(self, ips: Vec<IpAddr>) -> Vec<IpAddr> {
        let (v4, v6): (Vec<_>, Vec<_>) = ips.into_iter().partition(IpAddr::is_ipv4);
        match self {
            AddressFamily::Ipv4ThenIpv6 => v4.into_iter().chain(v6).collect(),
            AddressFamily::Ipv6ThenIpv4 => v6.into_iter().chain(v4).collect(),
            AddressFamily::Ipv4Only => v4,
            AddressFamily::Ipv6Only => v6,
        }
    }
}

/// One candidate produced by a forward lookup.
///
/// Keeps the host name it was resolved from and lazily caches the canonical
/// name obtained by a reverse lookup. Clones share the cache.
#[derive(Clone)]
pub struct Address {
    ip: IpAddr,
    host: Name,
    canonical: Arc<OnceLock<String>>,
}

impl Address {
    pub fn new(ip: IpAddr, host: Name) -> Self {
        Self { ip, host, canonical: Arc::new(OnceLock::new()) }
    }

    /// Builds an address from an IP literal, bypassing resolution.
    ///
    /// Returns `None` if `host` is a name that requires DNS.
    pub fn literal(host: &str) -> Option<Self> {
        let trimmed = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        trimmed.parse::<IpAddr>().ok().map(|ip| Self::new(ip, Name::new(host)))
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// The host name this address was resolved from.
    pub fn host(&self) -> &Name {
        &self.host
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, port)
    }

    /// Returns the canonical name, performing the reverse lookup on first use.
    pub fn canonical_name(&self, resolver: &dyn Resolve) -> Result<&str, NetError> {
        if self.canonical.get().is_none() {
            let name = resolver.reverse(self.ip)?;
            tracing::debug!(ip = %self.ip, name = %name, "cached canonical name");
            // A concurrent clone may have won the race; either value is valid.
            let _ = self.canonical.set(name);
        }
        self.canonical.get().map(String::as_str).ok_or(NetError::Unexpected)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.ip == other.ip && self.host == other.host
    }
}

impl Eq for Address {}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("ip", &self.ip)
            .field("host", &self.host)
            .field("canonical", &self.canonical.get())
            .finish()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ip, self.host)
    }
}

/// Trait for DNS resolution.
///
/// This is the core abstraction for DNS resolvers in evnet, equivalent
/// to Chromium's `HostResolver`. Both calls block; the engine runs them on
/// background worker threads, so implementations must be thread-safe.
pub trait Resolve: Send + Sync {
    /// Forward lookup. Returns every address known for `name`, in the
    /// order the underlying resolver produced them.
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError>;

    /// Reverse lookup of `ip` to its canonical host name.
    fn reverse(&self, ip: IpAddr) -> Result<String, NetError>;
}

/// Blanket implementation for Arc-wrapped resolvers.
impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        (**self).resolve(name)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        (**self).reverse(ip)
    }
}

/// Resolves `name` and turns the result into ordered candidates.
///
/// IP literals are answered without consulting `resolver`. The family
/// preference is applied once; an empty list afterwards is an error.
pub fn lookup(
    resolver: &dyn Resolve,
    name: &Name,
    family: AddressFamily,
) -> Result<Vec<Address>, NetError> {
    if let Some(addr) = Address::literal(name.as_str()) {
        return Ok(vec![addr]);
    }

    let ips = family.apply(resolver.resolve(name)?);
    if ips.is_empty() {
        tracing::debug!(domain = %name, ?family, "no candidates left after family filter");
        return Err(NetError::NameNotResolved);
    }
    Ok(ips.into_iter().map(|ip| Address::new(ip, name.clone())).collect())
}

/// DNS resolver wrapper that supports hostname overrides.
///
/// This resolver first checks a map of hostname-to-address overrides before
/// falling back to the underlying resolver. Useful for:
/// - Testing without real DNS
/// - Forcing specific IPs for certain domains
/// - Local development with custom hostnames
///
/// # Example
///
/// ```rust,ignore
/// use evnet::dns::{DnsResolverWithOverrides, GaiResolver};
/// use std::collections::HashMap;
///
/// let mut overrides = HashMap::new();
/// overrides.insert("api.local".into(), vec!["127.0.0.1".parse().unwrap()]);
///
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()), overrides);
/// ```
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: Arc<HashMap<Cow<'static, str>, Vec<IpAddr>>>,
}

impl DnsResolverWithOverrides {
    /// Creates a new resolver with the given overrides.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fallback resolver for non-overridden hostnames.
    /// * `overrides` - Map of hostnames to their resolved addresses.
    pub fn new(
        inner: Arc<dyn Resolve>,
        overrides: HashMap<Cow<'static, str>, Vec<IpAddr>>,
    ) -> Self {
        Self { inner, overrides: Arc::new(overrides) }
    }

    /// Returns the number of configured overrides.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        if let Some(ips) = self.overrides.get(name.as_str()) {
            tracing::debug!(domain = %name, count = ips.len(), "using DNS override");
            return Ok(ips.clone());
        }
        self.inner.resolve(name)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        let hit = self.overrides.iter().find(|(_, ips)| ips.contains(&ip));
        match hit {
            Some((host, _)) => Ok(host.to_string()),
            None => self.inner.reverse(ip),
        }
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("overrides", &self.overrides.len())
            .finish_non_exhaustive()
    }
}
