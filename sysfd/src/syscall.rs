//! Checked invocations of the raw libc entry points.
//!
//! Every function performs exactly one call and converts the failure
//! convention of that call (`-1`, negative, null, or zero, depending on the
//! API) into an [`Errno`]. Functions that cannot be made safe by taking
//! slices or references are `unsafe` and state what the caller must uphold.
//! Nothing here owns anything: ownership of returned descriptors, mappings
//! and lists is taken over by the wrapper types built on top.
use std::ffi::CStr;
use std::io::IoSlice;
use std::io::IoSliceMut;
use std::os::unix::io::RawFd;

use libc::c_int;
use libc::c_uint;
use libc::c_ulong;
use libc::c_void;

use crate::error::Errno;
use crate::error::Result;

fn check(ret: c_int) -> Result<c_int> {
    if ret < 0 { Err(Errno::last()) } else { Ok(ret) }
}

fn check_size(ret: isize) -> Result<usize> {
    if ret < 0 {
        Err(Errno::last())
    } else {
        Ok(ret as usize)
    }
}

pub fn close(fd: RawFd) -> Result<()> {
    // SAFETY: close is always safe to call; the kernel validates the fd.
    check(unsafe { libc::close(fd) })?;
    Ok(())
}

pub fn open(path: &CStr, flags: c_int, mode: libc::mode_t) -> Result<RawFd> {
    // SAFETY: path is a valid NUL-terminated string for the whole call.
    check(unsafe { libc::open(path.as_ptr(), flags, mode as c_uint) })
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    // SAFETY: buf is valid for writes of buf.len() bytes.
    check_size(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) })
}

pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    // SAFETY: buf is valid for reads of buf.len() bytes.
    check_size(unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) })
}

pub fn readv(fd: RawFd, bufs: &mut [IoSliceMut<'_>]) -> Result<usize> {
    // SAFETY: IoSliceMut is guaranteed ABI-compatible with iovec, and each
    // slice is valid for writes of its length.
    check_size(unsafe {
        libc::readv(
            fd,
            bufs.as_mut_ptr() as *mut libc::iovec,
            bufs.len().try_into().map_err(|_| Errno::EINVAL)?,
        )
    })
}

pub fn writev(fd: RawFd, bufs: &[IoSlice<'_>]) -> Result<usize> {
    // SAFETY: IoSlice is guaranteed ABI-compatible with iovec, and each
    // slice is valid for reads of its length.
    check_size(unsafe {
        libc::writev(
            fd,
            bufs.as_ptr() as *const libc::iovec,
            bufs.len().try_into().map_err(|_| Errno::EINVAL)?,
        )
    })
}

pub fn lseek(fd: RawFd, offset: i64, whence: c_int) -> Result<u64> {
    // SAFETY: lseek has no memory arguments.
    let pos = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if pos < 0 {
        Err(Errno::last())
    } else {
        Ok(pos as u64)
    }
}

pub fn fcntl(fd: RawFd, cmd: c_int, arg: c_int) -> Result<c_int> {
    // SAFETY: only integer-argument fcntl commands are reachable from this
    // signature; commands taking pointers need their own wrapper.
    check(unsafe { libc::fcntl(fd, cmd, arg) })
}

/// Issues a device control request.
///
/// # Safety
///
/// `arg` must be valid for whatever reads and writes `request` implies, or
/// null if the request takes no argument.
pub unsafe fn ioctl(fd: RawFd, request: c_ulong, arg: *mut c_void) -> Result<c_int> {
    check(unsafe { libc::ioctl(fd, request, arg) })
}

pub fn epoll_create1(flags: c_int) -> Result<RawFd> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::epoll_create1(flags) })
}

pub fn epoll_ctl(
    epfd: RawFd,
    op: c_int,
    fd: RawFd,
    event: Option<&mut libc::epoll_event>,
) -> Result<()> {
    let event = match event {
        Some(event) => event as *mut libc::epoll_event,
        None => std::ptr::null_mut(),
    };
    // SAFETY: event is either null (EPOLL_CTL_DEL) or a valid epoll_event;
    // the kernel copies it before returning.
    check(unsafe { libc::epoll_ctl(epfd, op, fd, event) })?;
    Ok(())
}

pub fn epoll_wait(
    epfd: RawFd,
    events: &mut [libc::epoll_event],
    timeout_ms: c_int,
) -> Result<usize> {
    let maxevents = events.len().try_into().map_err(|_| Errno::EINVAL)?;
    // SAFETY: events is valid for writes of events.len() entries.
    let n = check(unsafe { libc::epoll_wait(epfd, events.as_mut_ptr(), maxevents, timeout_ms) })?;
    Ok(n as usize)
}

pub fn eventfd(initval: c_uint, flags: c_int) -> Result<RawFd> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::eventfd(initval, flags) })
}

pub fn timerfd_create(clockid: c_int, flags: c_int) -> Result<RawFd> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::timerfd_create(clockid, flags) })
}

pub fn timerfd_settime(
    fd: RawFd,
    flags: c_int,
    new_value: &libc::itimerspec,
) -> Result<libc::itimerspec> {
    let mut old_value = libc::itimerspec {
        it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        it_value: libc::timespec { tv_sec: 0, tv_nsec: 0 },
    };
    // SAFETY: both itimerspec pointers reference valid structures.
    check(unsafe { libc::timerfd_settime(fd, flags, new_value, &mut old_value) })?;
    Ok(old_value)
}

pub fn timerfd_gettime(fd: RawFd) -> Result<libc::itimerspec> {
    let mut curr_value = libc::itimerspec {
        it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        it_value: libc::timespec { tv_sec: 0, tv_nsec: 0 },
    };
    // SAFETY: the itimerspec pointer references a valid structure.
    check(unsafe { libc::timerfd_gettime(fd, &mut curr_value) })?;
    Ok(curr_value)
}

/// Maps memory.
///
/// # Safety
///
/// The caller must uphold the aliasing requirements of the requested mapping:
/// `addr` is a hint or a fixed address the caller controls, and when `fd` is
/// mapped, the descriptor must stay valid for the duration of the call.
pub unsafe fn mmap(
    addr: *mut c_void,
    len: usize,
    prot: c_int,
    flags: c_int,
    fd: RawFd,
    offset: i64,
) -> Result<*mut c_void> {
    let ptr = unsafe { libc::mmap(addr, len, prot, flags, fd, offset as libc::off_t) };
    if ptr == libc::MAP_FAILED {
        Err(Errno::last())
    } else {
        Ok(ptr)
    }
}

/// Unmaps memory.
///
/// # Safety
///
/// `addr`/`len` must denote a live mapping, and nothing may reference the
/// region after the call.
pub unsafe fn munmap(addr: *mut c_void, len: usize) -> Result<()> {
    check(unsafe { libc::munmap(addr, len) })?;
    Ok(())
}

pub fn socket(domain: c_int, ty: c_int, protocol: c_int) -> Result<RawFd> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::socket(domain, ty, protocol) })
}

/// Binds a socket.
///
/// # Safety
///
/// `addr` must point to a valid socket address of `len` bytes.
pub unsafe fn bind(fd: RawFd, addr: *const libc::sockaddr, len: libc::socklen_t) -> Result<()> {
    check(unsafe { libc::bind(fd, addr, len) })?;
    Ok(())
}

/// Connects a socket.
///
/// # Safety
///
/// `addr` must point to a valid socket address of `len` bytes.
pub unsafe fn connect(fd: RawFd, addr: *const libc::sockaddr, len: libc::socklen_t) -> Result<()> {
    check(unsafe { libc::connect(fd, addr, len) })?;
    Ok(())
}

pub fn listen(fd: RawFd, backlog: c_int) -> Result<()> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::listen(fd, backlog) })?;
    Ok(())
}

/// Accepts a connection.
///
/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must point to
/// the size of that buffer; both may instead be null.
pub unsafe fn accept(
    fd: RawFd,
    addr: *mut libc::sockaddr,
    len: *mut libc::socklen_t,
) -> Result<RawFd> {
    check(unsafe { libc::accept(fd, addr, len) })
}

pub fn shutdown(fd: RawFd, how: c_int) -> Result<()> {
    // SAFETY: no memory arguments.
    check(unsafe { libc::shutdown(fd, how) })?;
    Ok(())
}

pub fn send(fd: RawFd, buf: &[u8], flags: c_int) -> Result<usize> {
    // SAFETY: buf is valid for reads of buf.len() bytes.
    check_size(unsafe { libc::send(fd, buf.as_ptr() as *const c_void, buf.len(), flags) })
}

pub fn recv(fd: RawFd, buf: &mut [u8], flags: c_int) -> Result<usize> {
    // SAFETY: buf is valid for writes of buf.len() bytes.
    check_size(unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags) })
}

/// Sends to an explicit destination address.
///
/// # Safety
///
/// `addr` must point to a valid socket address of `len` bytes.
pub unsafe fn sendto(
    fd: RawFd,
    buf: &[u8],
    flags: c_int,
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> Result<usize> {
    check_size(unsafe {
        libc::sendto(fd, buf.as_ptr() as *const c_void, buf.len(), flags, addr, len)
    })
}

/// Receives along with the source address.
///
/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must point to
/// the size of that buffer; both may instead be null.
pub unsafe fn recvfrom(
    fd: RawFd,
    buf: &mut [u8],
    flags: c_int,
    addr: *mut libc::sockaddr,
    len: *mut libc::socklen_t,
) -> Result<usize> {
    check_size(unsafe {
        libc::recvfrom(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags, addr, len)
    })
}

/// Sends a message described by `msg`.
///
/// # Safety
///
/// Every pointer reachable from `msg` (iovecs, name, control data) must be
/// valid for the implied reads.
pub unsafe fn sendmsg(fd: RawFd, msg: &libc::msghdr, flags: c_int) -> Result<usize> {
    check_size(unsafe { libc::sendmsg(fd, msg, flags) })
}

/// Receives a message into the buffers described by `msg`.
///
/// # Safety
///
/// Every pointer reachable from `msg` must be valid for the implied writes.
pub unsafe fn recvmsg(fd: RawFd, msg: &mut libc::msghdr, flags: c_int) -> Result<usize> {
    check_size(unsafe { libc::recvmsg(fd, msg, flags) })
}

/// Reads a socket option into a caller-provided buffer.
///
/// # Safety
///
/// `optval` must be valid for writes of `*optlen` bytes and `optlen` must
/// point to the size of that buffer.
pub unsafe fn getsockopt(
    fd: RawFd,
    level: c_int,
    optname: c_int,
    optval: *mut c_void,
    optlen: *mut libc::socklen_t,
) -> Result<()> {
    check(unsafe { libc::getsockopt(fd, level, optname, optval, optlen) })?;
    Ok(())
}

/// Sets a socket option from a caller-provided buffer.
///
/// # Safety
///
/// `optval` must be valid for reads of `optlen` bytes.
pub unsafe fn setsockopt(
    fd: RawFd,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: libc::socklen_t,
) -> Result<()> {
    check(unsafe { libc::setsockopt(fd, level, optname, optval, optlen) })?;
    Ok(())
}

/// Retrieves the local address of a socket.
///
/// # Safety
///
/// `addr` must be valid for writes of `*len` bytes and `len` must point to
/// the size of that buffer.
pub unsafe fn getsockname(
    fd: RawFd,
    addr: *mut libc::sockaddr,
    len: *mut libc::socklen_t,
) -> Result<()> {
    check(unsafe { libc::getsockname(fd, addr, len) })?;
    Ok(())
}

pub fn getifaddrs() -> Result<*mut libc::ifaddrs> {
    let mut list: *mut libc::ifaddrs = std::ptr::null_mut();
    // SAFETY: the out-pointer references a valid location; on success the
    // caller takes over ownership of the returned list.
    if unsafe { libc::getifaddrs(&mut list) } != 0 {
        return Err(Errno::last());
    }
    Ok(list)
}

/// Frees an interface list returned by [`getifaddrs`].
///
/// # Safety
///
/// `list` must be a list obtained from [`getifaddrs`] that has not been freed
/// yet, and nothing may reference its nodes after the call.
pub unsafe fn freeifaddrs(list: *mut libc::ifaddrs) {
    unsafe { libc::freeifaddrs(list) }
}

pub fn if_nametoindex(name: &CStr) -> Result<c_uint> {
    // SAFETY: name is a valid NUL-terminated string for the whole call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index == 0 {
        return Err(Errno::last());
    }
    Ok(index)
}
