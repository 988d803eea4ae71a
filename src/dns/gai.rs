//! System DNS resolver using getaddrinfo.
//!
//! This resolver uses the operating system's native DNS resolution via
//! `getaddrinfo` for forward lookups and `getnameinfo` for reverse lookups.
//! Both calls block; the engine runs them on its resolver threads.
//!
//! # When to Use
//!
//! - When you need to respect system DNS configuration (/etc/resolv.conf, /etc/hosts)
//! - When DoH/DoT is not required

use super::{Name, Resolve};
use crate::base::neterror::NetError;
use std::net::{IpAddr, ToSocketAddrs};

/// System DNS resolver using `getaddrinfo`.
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    /// Creates a new `GaiResolver`.
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: &Name) -> Result<Vec<IpAddr>, NetError> {
        tracing::debug!(host = %name, "resolving via getaddrinfo");

        let addrs = (name.as_str(), 0u16).to_socket_addrs().map_err(|e| {
            tracing::debug!(domain = %name, error = %e, "DNS resolution failed");
            NetError::NameNotResolved
        })?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            // getaddrinfo repeats an address once per socket type
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }

        if ips.is_empty() {
            tracing::debug!(domain = %name, "no addresses returned by getaddrinfo");
            return Err(NetError::NameNotResolved);
        }

        tracing::debug!(domain = %name, count = ips.len(), "DNS resolution complete");
        Ok(ips)
    }

    fn reverse(&self, ip: IpAddr) -> Result<String, NetError> {
        tracing::debug!(ip = %ip, "reverse lookup via getnameinfo");
        sys::getnameinfo(ip)
    }
}

#[cfg(unix)]
mod sys {
    use crate::base::neterror::NetError;
    use std::ffi::CStr;
    use std::mem;
    use std::net::IpAddr;
    use std::ptr;

    const HOST_BUF_LEN: usize = 1025;

    pub(super) fn getnameinfo(ip: IpAddr) -> Result<String, NetError> {
        // SAFETY: all-zero is a valid bit pattern for sockaddr_storage.
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let len = match ip {
            IpAddr::V4(v4) => {
                // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in.
                let sin = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in) };
                sin.sin_family = libc::AF_INET as libc::sa_family_t;
                sin.sin_addr.s_addr = u32::from_ne_bytes(v4.octets());
                mem::size_of::<libc::sockaddr_in>()
            }
            IpAddr::V6(v6) => {
                // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in6.
                let sin6 = unsafe { &mut *(&mut storage as *mut _ as *mut libc::sockaddr_in6) };
                sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sin6.sin6_addr.s6_addr = v6.octets();
                mem::size_of::<libc::sockaddr_in6>()
            }
        };

        let mut host = [0 as libc::c_char; HOST_BUF_LEN];
        // SAFETY: storage holds an initialized sockaddr of `len` bytes and host is a
        // writable buffer of the advertised length.
        let rc = unsafe {
            libc::getnameinfo(
                &storage as *const _ as *const libc::sockaddr,
                len as libc::socklen_t,
                host.as_mut_ptr(),
                HOST_BUF_LEN as libc::socklen_t,
                ptr::null_mut(),
                0,
                libc::NI_NAMEREQD,
            )
        };
        if rc != 0 {
            tracing::debug!(ip = %ip, rc, "reverse lookup failed");
            return Err(NetError::NameNotResolved);
        }

        // SAFETY: getnameinfo NUL-terminates the host buffer on success.
        let name = unsafe { CStr::from_ptr(host.as_ptr()) };
        Ok(name.to_string_lossy().into_owned())
    }
}

#[cfg(not(unix))]
mod sys {
    use crate::base::neterror::NetError;
    use std::net::IpAddr;

    pub(super) fn getnameinfo(_ip: IpAddr) -> Result<String, NetError> {
        Err(NetError::NameResolutionFailed)
    }
}
