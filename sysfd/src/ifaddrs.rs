//! The kernel's network interface address list.
use core::marker::PhantomData;
use std::ffi::CStr;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::net::SocketAddrV6;

use libc::c_uint;
use log::debug;
use log::trace;
use thiserror::Error;

use crate::error::Errno;
use crate::handle::Handle;
use crate::handle::Resource;
use crate::net;
use crate::syscall;

impl Resource for *mut libc::ifaddrs {
    const CLOSED: *mut libc::ifaddrs = std::ptr::null_mut();

    fn release(self) {
        trace!("freeing interface list at {:p}", self);
        // SAFETY: the value came from a successful getifaddrs and the owning
        // handle guarantees release happens at most once.
        unsafe { syscall::freeifaddrs(self) }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IfaddrsError {
    #[error("failed to list network interfaces: {0}")]
    Fetch(#[from] Errno),
    #[error("no link-local address on interface '{0}'")]
    NoLinkLocal(String),
}

/// An owned snapshot of the interface address list, from `getifaddrs(3)`.
///
/// The list is a linked chain of per-address entries; an interface appears
/// once per address family it has an address in. Freed with `freeifaddrs(3)`
/// on drop.
pub struct InterfaceAddrs {
    handle: Handle<*mut libc::ifaddrs>,
}

impl InterfaceAddrs {
    pub fn fetch() -> Result<InterfaceAddrs, Errno> {
        let list = syscall::getifaddrs()?;
        Ok(InterfaceAddrs { handle: Handle::from_raw(list) })
    }

    pub fn iter(&self) -> InterfaceIter<'_> {
        InterfaceIter {
            current: self.handle.get(),
            _list: PhantomData,
        }
    }
}

pub struct InterfaceIter<'a> {
    current: *const libc::ifaddrs,
    _list: PhantomData<&'a InterfaceAddrs>,
}

impl<'a> Iterator for InterfaceIter<'a> {
    type Item = Interface<'a>;

    fn next(&mut self) -> Option<Interface<'a>> {
        if self.current.is_null() {
            return None;
        }
        // SAFETY: current points into the list owned by the InterfaceAddrs
        // this iterator borrows, which stays alive (and unfreed) for 'a.
        let entry = unsafe { &*self.current };
        self.current = entry.ifa_next;
        Some(Interface { entry })
    }
}

/// One entry of the interface address list.
pub struct Interface<'a> {
    entry: &'a libc::ifaddrs,
}

impl Interface<'_> {
    pub fn name(&self) -> &CStr {
        // SAFETY: ifa_name is a NUL-terminated string owned by the list.
        unsafe { CStr::from_ptr(self.entry.ifa_name) }
    }

    /// Interface flags (`IFF_*`).
    pub fn flags(&self) -> c_uint {
        self.entry.ifa_flags
    }

    /// The entry's address, when it is an `AF_INET`/`AF_INET6` one.
    ///
    /// Entries for other families (notably `AF_PACKET`) report `None`.
    pub fn addr(&self) -> Option<SocketAddr> {
        // SAFETY: ifa_addr is either null or a socket address valid for its
        // family, owned by the list.
        unsafe { net::sockaddr_to_std(self.entry.ifa_addr) }
    }
}

/// Tests if an IPv6 address has link-local scope.
///
/// True exactly for the range [`fe80::`, `fe81::`).
pub fn is_link_local(addr: Ipv6Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 0xfe && octets[1] == 0x80
}

/// Returns the first link-local IPv6 address of the named interface.
///
/// An interface can carry several link-local addresses; whichever the kernel
/// lists first is returned, so repeated calls are not guaranteed to agree. An
/// interface with IPv6 disabled has none at all.
pub fn link_local_v6(interface: &str) -> Result<SocketAddrV6, IfaddrsError> {
    let list = InterfaceAddrs::fetch()?;

    for entry in list.iter() {
        if entry.name().to_bytes() != interface.as_bytes() {
            continue;
        }
        if let Some(SocketAddr::V6(addr)) = entry.addr() {
            if is_link_local(*addr.ip()) {
                return Ok(addr);
            }
            debug!("skipping non-link-local address on {}", interface);
        }
    }

    Err(IfaddrsError::NoLinkLocal(interface.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_local_range_boundaries() {
        assert!(is_link_local("fe80::".parse().unwrap()));
        assert!(is_link_local("fe80::1".parse().unwrap()));
        assert!(is_link_local("fe80:ffff::1".parse().unwrap()));
        assert!(!is_link_local("fe81::".parse().unwrap()));
        assert!(!is_link_local("fec0::1".parse().unwrap()));
        assert!(!is_link_local("2001:db8::1".parse().unwrap()));
        assert!(!is_link_local("::1".parse().unwrap()));
    }

    #[test]
    fn test_fetch_lists_loopback() {
        let list = InterfaceAddrs::fetch().unwrap();
        assert!(list.iter().any(|entry| entry.name().to_bytes() == b"lo"));
    }

    #[test]
    fn test_entries_decode_without_panicking() {
        let list = InterfaceAddrs::fetch().unwrap();
        for entry in list.iter() {
            let _ = entry.name();
            let _ = entry.flags();
            let _ = entry.addr();
        }
    }

    #[test]
    fn test_link_local_v6_missing_interface() {
        let err = link_local_v6("sysfd-no-such-if").unwrap_err();
        assert_eq!(
            err,
            IfaddrsError::NoLinkLocal("sysfd-no-such-if".to_string())
        );
    }
}
