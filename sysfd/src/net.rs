//! Sockets and socket addresses.
use core::mem;
use core::ops::BitOr;
use std::ffi::CString;
use std::io::IoSlice;
use std::io::IoSliceMut;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::net::Shutdown;
use std::net::SocketAddr;
use std::net::SocketAddrV4;
use std::net::SocketAddrV6;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use libc::c_int;
use libc::c_void;

use crate::error::Errno;
use crate::error::Result;
use crate::handle::OwnedFd;
use crate::syscall;

/// A socket communication domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain(c_int);

impl Domain {
    pub const INET: Domain = Domain(libc::AF_INET);
    pub const INET6: Domain = Domain(libc::AF_INET6);

    pub const fn from_raw(raw: c_int) -> Domain {
        Domain(raw)
    }

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

/// A socket type, optionally combined with creation-time flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Type(c_int);

impl Type {
    pub const STREAM: Type = Type(libc::SOCK_STREAM);
    pub const DGRAM: Type = Type(libc::SOCK_DGRAM);
    pub const NONBLOCK: Type = Type(libc::SOCK_NONBLOCK);
    pub const CLOEXEC: Type = Type(libc::SOCK_CLOEXEC);

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

impl BitOr for Type {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Type(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol(c_int);

impl Protocol {
    pub const DEFAULT: Protocol = Protocol(0);
    pub const TCP: Protocol = Protocol(libc::IPPROTO_TCP);
    pub const UDP: Protocol = Protocol(libc::IPPROTO_UDP);

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

/// Flags for the send/receive family of calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags(c_int);

impl MsgFlags {
    pub const NONE: MsgFlags = MsgFlags(0);
    pub const PEEK: MsgFlags = MsgFlags(libc::MSG_PEEK);
    pub const DONTWAIT: MsgFlags = MsgFlags(libc::MSG_DONTWAIT);
    pub const NOSIGNAL: MsgFlags = MsgFlags(libc::MSG_NOSIGNAL);
    pub const TRUNC: MsgFlags = MsgFlags(libc::MSG_TRUNC);

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

impl BitOr for MsgFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        MsgFlags(self.0 | rhs.0)
    }
}

/// A `sockaddr_storage` paired with the length the kernel cares about.
pub(crate) struct SockAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl SockAddr {
    pub(crate) fn zeroed() -> SockAddr {
        SockAddr {
            // SAFETY: sockaddr_storage is plain data; all-zeroes is valid.
            storage: unsafe { mem::zeroed() },
            len: mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
        }
    }

    pub(crate) fn from_std(addr: &SocketAddr) -> SockAddr {
        let mut out = SockAddr::zeroed();
        match addr {
            SocketAddr::V4(v4) => {
                let sin = libc::sockaddr_in {
                    sin_family: libc::AF_INET as libc::sa_family_t,
                    sin_port: v4.port().to_be(),
                    sin_addr: libc::in_addr {
                        s_addr: u32::from_ne_bytes(v4.ip().octets()),
                    },
                    sin_zero: [0; 8],
                };
                // SAFETY: sockaddr_storage is defined to hold any sockaddr_*.
                unsafe {
                    *(&mut out.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in) =
                        sin;
                }
                out.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            }
            SocketAddr::V6(v6) => {
                let sin6 = libc::sockaddr_in6 {
                    sin6_family: libc::AF_INET6 as libc::sa_family_t,
                    sin6_port: v6.port().to_be(),
                    sin6_flowinfo: v6.flowinfo(),
                    sin6_addr: libc::in6_addr {
                        s6_addr: v6.ip().octets(),
                    },
                    sin6_scope_id: v6.scope_id(),
                };
                // SAFETY: sockaddr_storage is defined to hold any sockaddr_*.
                unsafe {
                    *(&mut out.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr_in6) =
                        sin6;
                }
                out.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
            }
        }
        out
    }

    pub(crate) fn to_std(&self) -> Result<SocketAddr> {
        match self.storage.ss_family as c_int {
            libc::AF_INET => {
                // SAFETY: the family tag says the storage holds a sockaddr_in.
                let sin = unsafe {
                    *(&self.storage as *const libc::sockaddr_storage as *const libc::sockaddr_in)
                };
                Ok(SocketAddr::V4(SocketAddrV4::new(
                    Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
                    u16::from_be(sin.sin_port),
                )))
            }
            libc::AF_INET6 => {
                // SAFETY: the family tag says the storage holds a sockaddr_in6.
                let sin6 = unsafe {
                    *(&self.storage as *const libc::sockaddr_storage as *const libc::sockaddr_in6)
                };
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                    u16::from_be(sin6.sin6_port),
                    sin6.sin6_flowinfo,
                    sin6.sin6_scope_id,
                )))
            }
            _ => Err(Errno::EAFNOSUPPORT),
        }
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        &self.storage as *const libc::sockaddr_storage as *const libc::sockaddr
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
        &mut self.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr
    }

    pub(crate) fn len(&self) -> libc::socklen_t {
        self.len
    }

    pub(crate) fn len_mut(&mut self) -> *mut libc::socklen_t {
        &mut self.len
    }
}

/// Decodes a raw `sockaddr` whose size is implied by its family.
///
/// Returns `None` for families other than `AF_INET`/`AF_INET6`.
///
/// # Safety
///
/// `addr` must either be null or point to a socket address structure valid
/// for its declared family.
pub(crate) unsafe fn sockaddr_to_std(addr: *const libc::sockaddr) -> Option<SocketAddr> {
    if addr.is_null() {
        return None;
    }
    let mut storage = SockAddr::zeroed();
    // SAFETY: per the contract, addr points to a structure of at least the
    // size its family implies; both variants fit in sockaddr_storage.
    let family = unsafe { (*addr).sa_family } as c_int;
    let size = match family {
        libc::AF_INET => mem::size_of::<libc::sockaddr_in>(),
        libc::AF_INET6 => mem::size_of::<libc::sockaddr_in6>(),
        _ => return None,
    };
    // SAFETY: size bytes are readable from addr, and the destination storage
    // is at least as large.
    unsafe {
        std::ptr::copy_nonoverlapping(
            addr as *const u8,
            &mut storage.storage as *mut libc::sockaddr_storage as *mut u8,
            size,
        );
    }
    storage.len = size as libc::socklen_t;
    storage.to_std().ok()
}

/// A socket descriptor.
///
/// Closed on drop. All I/O is a direct pass-through; blocking behavior
/// follows from the socket's flags.
pub struct Socket {
    handle: OwnedFd,
}

impl Socket {
    pub fn new(domain: Domain, ty: Type) -> Result<Socket> {
        Self::with_protocol(domain, ty, Protocol::DEFAULT)
    }

    pub fn with_protocol(domain: Domain, ty: Type, protocol: Protocol) -> Result<Socket> {
        let fd = syscall::socket(domain.as_raw(), ty.as_raw(), protocol.as_raw())?;
        Ok(Socket { handle: OwnedFd::from_raw(fd) })
    }

    pub fn from_handle(handle: OwnedFd) -> Socket {
        Socket { handle }
    }

    pub fn handle(&self) -> &OwnedFd {
        &self.handle
    }

    pub fn bind(&self, addr: &SocketAddr) -> Result<()> {
        let addr = SockAddr::from_std(addr);
        // SAFETY: the pointer and length describe a valid socket address.
        unsafe { syscall::bind(self.handle.get(), addr.as_ptr(), addr.len()) }
    }

    pub fn connect(&self, addr: &SocketAddr) -> Result<()> {
        let addr = SockAddr::from_std(addr);
        // SAFETY: the pointer and length describe a valid socket address.
        unsafe { syscall::connect(self.handle.get(), addr.as_ptr(), addr.len()) }
    }

    pub fn listen(&self, backlog: c_int) -> Result<()> {
        syscall::listen(self.handle.get(), backlog)
    }

    /// Accepts a connection, returning the new socket and the peer address.
    pub fn accept(&self) -> Result<(Socket, SocketAddr)> {
        let mut addr = SockAddr::zeroed();
        // SAFETY: the pointers reference addr's storage and its length.
        let fd = unsafe { syscall::accept(self.handle.get(), addr.as_mut_ptr(), addr.len_mut())? };
        let socket = Socket { handle: OwnedFd::from_raw(fd) };
        Ok((socket, addr.to_std()?))
    }

    /// Returns the address the socket is bound to.
    ///
    /// After binding to port 0 this recovers the port the kernel picked.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let mut addr = SockAddr::zeroed();
        // SAFETY: the pointers reference addr's storage and its length.
        unsafe { syscall::getsockname(self.handle.get(), addr.as_mut_ptr(), addr.len_mut())? };
        addr.to_std()
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        let how = match how {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        };
        syscall::shutdown(self.handle.get(), how)
    }

    pub fn send(&self, buf: &[u8], flags: MsgFlags) -> Result<usize> {
        syscall::send(self.handle.get(), buf, flags.as_raw())
    }

    pub fn recv(&self, buf: &mut [u8], flags: MsgFlags) -> Result<usize> {
        syscall::recv(self.handle.get(), buf, flags.as_raw())
    }

    pub fn send_to(&self, buf: &[u8], flags: MsgFlags, dest: &SocketAddr) -> Result<usize> {
        let dest = SockAddr::from_std(dest);
        // SAFETY: the pointer and length describe a valid socket address.
        unsafe { syscall::sendto(self.handle.get(), buf, flags.as_raw(), dest.as_ptr(), dest.len()) }
    }

    pub fn recv_from(&self, buf: &mut [u8], flags: MsgFlags) -> Result<(usize, SocketAddr)> {
        let mut src = SockAddr::zeroed();
        // SAFETY: the pointers reference src's storage and its length.
        let n = unsafe {
            syscall::recvfrom(
                self.handle.get(),
                buf,
                flags.as_raw(),
                src.as_mut_ptr(),
                src.len_mut(),
            )?
        };
        Ok((n, src.to_std()?))
    }

    /// Gather-sends `bufs` as one message with `sendmsg(2)`.
    pub fn send_msg(
        &self,
        bufs: &[IoSlice<'_>],
        flags: MsgFlags,
        dest: Option<&SocketAddr>,
    ) -> Result<usize> {
        let dest = dest.map(SockAddr::from_std);
        // SAFETY: msghdr is plain data; all-zeroes is a valid empty header.
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        if let Some(dest) = &dest {
            hdr.msg_name = dest.as_ptr() as *mut c_void;
            hdr.msg_namelen = dest.len();
        }
        hdr.msg_iov = bufs.as_ptr() as *mut libc::iovec;
        hdr.msg_iovlen = bufs.len();
        // SAFETY: the iovecs borrow bufs and the name borrows dest, both of
        // which outlive the call.
        unsafe { syscall::sendmsg(self.handle.get(), &hdr, flags.as_raw()) }
    }

    /// Scatter-receives one message into `bufs` with `recvmsg(2)`.
    ///
    /// The source address is reported when the protocol provides one
    /// (datagram sockets); connected stream sockets report `None`.
    pub fn recv_msg(
        &self,
        bufs: &mut [IoSliceMut<'_>],
        flags: MsgFlags,
    ) -> Result<(usize, Option<SocketAddr>)> {
        let mut src = SockAddr::zeroed();
        // SAFETY: msghdr is plain data; all-zeroes is a valid empty header.
        let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
        hdr.msg_name = src.as_mut_ptr() as *mut c_void;
        hdr.msg_namelen = src.len();
        hdr.msg_iov = bufs.as_mut_ptr() as *mut libc::iovec;
        hdr.msg_iovlen = bufs.len();
        // SAFETY: the iovecs borrow bufs and the name borrows src, both of
        // which outlive the call.
        let n = unsafe { syscall::recvmsg(self.handle.get(), &mut hdr, flags.as_raw())? };
        let addr = if hdr.msg_namelen == 0 {
            None
        } else {
            src.to_std().ok()
        };
        Ok((n, addr))
    }

    pub fn set_reuseaddr(&self, reuse: bool) -> Result<()> {
        self.set_opt(libc::SOL_SOCKET, libc::SO_REUSEADDR, &(reuse as c_int))
    }

    pub fn reuseaddr(&self) -> Result<bool> {
        Ok(self.opt_int(libc::SOL_SOCKET, libc::SO_REUSEADDR)? != 0)
    }

    pub fn set_recv_buffer_size(&self, size: usize) -> Result<()> {
        let size: c_int = size.try_into().map_err(|_| Errno::EINVAL)?;
        self.set_opt(libc::SOL_SOCKET, libc::SO_RCVBUF, &size)
    }

    pub fn recv_buffer_size(&self) -> Result<usize> {
        Ok(self.opt_int(libc::SOL_SOCKET, libc::SO_RCVBUF)? as usize)
    }

    /// Returns and clears the pending socket error (`SO_ERROR`), if any.
    pub fn take_error(&self) -> Result<Option<Errno>> {
        let raw = self.opt_int(libc::SOL_SOCKET, libc::SO_ERROR)?;
        if raw == 0 {
            Ok(None)
        } else {
            Ok(Some(Errno::from_raw(raw)))
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        let mut raw = syscall::fcntl(self.handle.get(), libc::F_GETFL, 0)?;
        if nonblocking {
            raw |= libc::O_NONBLOCK;
        } else {
            raw &= !libc::O_NONBLOCK;
        }
        syscall::fcntl(self.handle.get(), libc::F_SETFL, raw)?;
        Ok(())
    }

    fn set_opt<T>(&self, level: c_int, name: c_int, value: &T) -> Result<()> {
        // SAFETY: value points to size_of::<T>() readable bytes.
        unsafe {
            syscall::setsockopt(
                self.handle.get(),
                level,
                name,
                value as *const T as *const c_void,
                mem::size_of::<T>() as libc::socklen_t,
            )
        }
    }

    fn opt_int(&self, level: c_int, name: c_int) -> Result<c_int> {
        let mut value: c_int = 0;
        let mut len = mem::size_of::<c_int>() as libc::socklen_t;
        // SAFETY: the pointers reference value and its length.
        unsafe {
            syscall::getsockopt(
                self.handle.get(),
                level,
                name,
                &mut value as *mut c_int as *mut c_void,
                &mut len,
            )?;
        }
        Ok(value)
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.get()
    }
}

/// Builds an IPv6 socket address scoped to a named interface.
///
/// Link-local addresses are ambiguous without a scope; this resolves the
/// interface name to its index with `if_nametoindex(3)`.
pub fn scoped_v6(addr: Ipv6Addr, port: u16, interface: &str) -> Result<SocketAddrV6> {
    let name = CString::new(interface).map_err(|_| Errno::EINVAL)?;
    let index = syscall::if_nametoindex(&name)?;
    Ok(SocketAddrV6::new(addr, port, 0, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_any() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    #[test]
    fn test_sockaddr_conversion_roundtrip() {
        let v4: SocketAddr = "192.0.2.7:8080".parse().unwrap();
        assert_eq!(SockAddr::from_std(&v4).to_std().unwrap(), v4);

        let v6: SocketAddr = "[2001:db8::1]:443".parse().unwrap();
        assert_eq!(SockAddr::from_std(&v6).to_std().unwrap(), v6);
    }

    #[test]
    fn test_udp_send_to_recv_from() {
        let receiver = Socket::new(Domain::INET, Type::DGRAM).unwrap();
        receiver.bind(&loopback_any()).unwrap();
        let dest = receiver.local_addr().unwrap();

        let sender = Socket::new(Domain::INET, Type::DGRAM).unwrap();
        assert_eq!(sender.send_to(b"ping", MsgFlags::NONE, &dest).unwrap(), 4);

        let mut buf = [0u8; 16];
        let (n, src) = receiver.recv_from(&mut buf, MsgFlags::NONE).unwrap();
        assert_eq!(&buf[..n], b"ping");
        assert_eq!(src.ip(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_udp_scatter_gather_message() {
        let receiver = Socket::new(Domain::INET, Type::DGRAM).unwrap();
        receiver.bind(&loopback_any()).unwrap();
        let dest = receiver.local_addr().unwrap();

        let sender = Socket::new(Domain::INET, Type::DGRAM).unwrap();
        let sent = sender
            .send_msg(
                &[IoSlice::new(b"scatter "), IoSlice::new(b"gather")],
                MsgFlags::NONE,
                Some(&dest),
            )
            .unwrap();
        assert_eq!(sent, 14);

        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        let (n, src) = receiver
            .recv_msg(
                &mut [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)],
                MsgFlags::NONE,
            )
            .unwrap();
        assert_eq!(n, 14);
        assert_eq!(&first, b"scatter ");
        assert_eq!(&second[..6], b"gather");
        assert!(src.is_some());
    }

    #[test]
    fn test_tcp_connect_accept_exchange() {
        let listener = Socket::new(Domain::INET, Type::STREAM).unwrap();
        listener.bind(&loopback_any()).unwrap();
        listener.listen(16).unwrap();
        let target = listener.local_addr().unwrap();

        let client = Socket::new(Domain::INET, Type::STREAM).unwrap();
        client.connect(&target).unwrap();

        let (server, peer) = listener.accept().unwrap();
        assert_eq!(peer.ip(), Ipv4Addr::LOCALHOST);

        assert_eq!(client.send(b"hello", MsgFlags::NONE).unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(server.recv(&mut buf, MsgFlags::NONE).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        client.shutdown(Shutdown::Write).unwrap();
        assert_eq!(server.recv(&mut buf, MsgFlags::NONE).unwrap(), 0);
    }

    #[test]
    fn test_reuseaddr_roundtrip() {
        let socket = Socket::new(Domain::INET, Type::STREAM).unwrap();
        assert!(!socket.reuseaddr().unwrap());
        socket.set_reuseaddr(true).unwrap();
        assert!(socket.reuseaddr().unwrap());
    }

    #[test]
    fn test_take_error_is_empty_on_fresh_socket() {
        let socket = Socket::new(Domain::INET, Type::DGRAM).unwrap();
        assert_eq!(socket.take_error().unwrap(), None);
    }

    #[test]
    fn test_scoped_v6_resolves_loopback_interface() {
        let addr = scoped_v6(Ipv6Addr::LOCALHOST, 0, "lo").unwrap();
        assert!(addr.scope_id() >= 1);
    }

    #[test]
    fn test_scoped_v6_unknown_interface_fails() {
        assert!(scoped_v6(Ipv6Addr::LOCALHOST, 0, "sysfd-no-such-if").is_err());
    }
}
