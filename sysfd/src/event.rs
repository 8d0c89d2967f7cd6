//! Event counter descriptors.
use core::ops::BitOr;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use libc::c_int;

use crate::error::Errno;
use crate::error::Result;
use crate::handle::OwnedFd;
use crate::syscall;

/// Flags for [`EventFd::new_with_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFlags(c_int);

impl EventFlags {
    pub const NONBLOCK: EventFlags = EventFlags(libc::EFD_NONBLOCK);
    pub const CLOEXEC: EventFlags = EventFlags(libc::EFD_CLOEXEC);
    pub const SEMAPHORE: EventFlags = EventFlags(libc::EFD_SEMAPHORE);

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

impl BitOr for EventFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        EventFlags(self.0 | rhs.0)
    }
}

/// An `eventfd(2)` counter.
///
/// The kernel object is a single 64-bit counter. [`write`](EventFd::write)
/// adds to it and wakes up waiters; [`read`](EventFd::read) returns the
/// accumulated value and resets it to zero (or decrements by one in
/// `SEMAPHORE` mode). A counter of zero blocks readers, which makes the
/// descriptor a lightweight wakeup primitive for a poll loop.
pub struct EventFd {
    handle: OwnedFd,
}

impl EventFd {
    /// Creates a counter with the given initial value, close-on-exec.
    pub fn new(initval: u32) -> Result<EventFd> {
        Self::new_with_flags(initval, EventFlags::CLOEXEC)
    }

    pub fn new_with_flags(initval: u32, flags: EventFlags) -> Result<EventFd> {
        let fd = syscall::eventfd(initval, flags.as_raw())?;
        Ok(EventFd { handle: OwnedFd::from_raw(fd) })
    }

    pub fn from_handle(handle: OwnedFd) -> EventFd {
        EventFd { handle }
    }

    pub fn handle(&self) -> &OwnedFd {
        &self.handle
    }

    /// Reads the counter, blocking while it is zero.
    pub fn read(&self) -> Result<u64> {
        let mut buf = [0u8; 8];
        let n = syscall::read(self.handle.get(), &mut buf)?;
        if n != buf.len() {
            return Err(Errno::EINVAL);
        }
        Ok(u64::from_ne_bytes(buf))
    }

    /// Adds `value` to the counter.
    pub fn write(&self, value: u64) -> Result<()> {
        let buf = value.to_ne_bytes();
        let n = syscall::write(self.handle.get(), &buf)?;
        if n != buf.len() {
            return Err(Errno::EINVAL);
        }
        Ok(())
    }
}

impl AsRawFd for EventFd {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_writes() {
        let eventfd = EventFd::new(0).unwrap();
        eventfd.write(2).unwrap();
        eventfd.write(3).unwrap();
        assert_eq!(eventfd.read().unwrap(), 5);
    }

    #[test]
    fn test_initial_value_is_readable() {
        let eventfd = EventFd::new(41).unwrap();
        assert_eq!(eventfd.read().unwrap(), 41);
    }

    #[test]
    fn test_nonblocking_read_on_zero_counter() {
        let eventfd =
            EventFd::new_with_flags(0, EventFlags::CLOEXEC | EventFlags::NONBLOCK).unwrap();
        assert_eq!(eventfd.read().unwrap_err(), Errno::EAGAIN);
    }

    #[test]
    fn test_semaphore_mode_decrements_by_one() {
        let eventfd =
            EventFd::new_with_flags(0, EventFlags::CLOEXEC | EventFlags::SEMAPHORE).unwrap();
        eventfd.write(2).unwrap();
        assert_eq!(eventfd.read().unwrap(), 1);
        assert_eq!(eventfd.read().unwrap(), 1);
    }
}
