//! Readiness notification through epoll.
use core::ops::BitAnd;
use core::ops::BitOr;
use core::ops::BitOrAssign;
use core::time::Duration;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use libc::c_int;

use crate::error::Errno;
use crate::error::Result;
use crate::handle::OwnedFd;
use crate::syscall;

/// Event kinds a descriptor can be watched for, or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Readiness(u32);

impl Readiness {
    pub const IN: Readiness = Readiness(libc::EPOLLIN as u32);
    pub const OUT: Readiness = Readiness(libc::EPOLLOUT as u32);
    pub const ERR: Readiness = Readiness(libc::EPOLLERR as u32);
    pub const HUP: Readiness = Readiness(libc::EPOLLHUP as u32);
    pub const RDHUP: Readiness = Readiness(libc::EPOLLRDHUP as u32);
    pub const ET: Readiness = Readiness(libc::EPOLLET as u32);
    pub const ONESHOT: Readiness = Readiness(libc::EPOLLONESHOT as u32);

    pub const fn new() -> Readiness {
        Readiness(0)
    }

    pub const fn from_raw(raw: u32) -> Readiness {
        Readiness(raw)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: Readiness) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for Readiness {
    fn default() -> Readiness {
        Readiness::new()
    }
}

impl BitOr for Readiness {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Readiness(self.0 | rhs.0)
    }
}

impl BitAnd for Readiness {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Readiness(self.0 & rhs.0)
    }
}

impl BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A single occurrence reported by [`Epoll::wait`].
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub readiness: Readiness,
    pub token: u64,
}

/// An epoll instance.
///
/// Registered descriptors carry a caller-chosen `token` which comes back in
/// the [`Event`]s reported by [`Epoll::wait`].
pub struct Epoll {
    handle: OwnedFd,
}

impl Epoll {
    pub fn new() -> Result<Epoll> {
        let fd = syscall::epoll_create1(libc::EPOLL_CLOEXEC)?;
        Ok(Epoll { handle: OwnedFd::from_raw(fd) })
    }

    pub fn add(&self, source: &impl AsRawFd, interests: Readiness, token: u64) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, source.as_raw_fd(), interests, token)
    }

    pub fn modify(&self, source: &impl AsRawFd, interests: Readiness, token: u64) -> Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, source.as_raw_fd(), interests, token)
    }

    pub fn remove(&self, source: &impl AsRawFd) -> Result<()> {
        syscall::epoll_ctl(self.handle.get(), libc::EPOLL_CTL_DEL, source.as_raw_fd(), None)
    }

    fn ctl(&self, op: c_int, fd: RawFd, interests: Readiness, token: u64) -> Result<()> {
        let mut event = libc::epoll_event {
            events: interests.as_raw(),
            u64: token,
        };
        syscall::epoll_ctl(self.handle.get(), op, fd, Some(&mut event))
    }

    /// Waits for events, filling `events` up to its capacity.
    ///
    /// `None` blocks until an event occurs; `Some(t)` gives up after `t`,
    /// reporting zero events. A timeout that doesn't fit epoll's millisecond
    /// argument is rejected with `EINVAL`.
    pub fn wait(&self, events: &mut Vec<Event>, timeout: Option<Duration>) -> Result<usize> {
        let timeout_ms: c_int = match timeout {
            None => -1,
            Some(timeout) => timeout.as_millis().try_into().map_err(|_| Errno::EINVAL)?,
        };

        events.clear();
        let capacity = events.capacity().max(1);
        let mut raw = vec![libc::epoll_event { events: 0, u64: 0 }; capacity];
        let n = syscall::epoll_wait(self.handle.get(), &mut raw, timeout_ms)?;
        for event in &raw[..n] {
            events.push(Event {
                readiness: Readiness::from_raw(event.events),
                token: event.u64,
            });
        }
        Ok(n)
    }
}

impl AsRawFd for Epoll {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventFd;

    #[test]
    fn test_wait_reports_registered_token() {
        let epoll = Epoll::new().unwrap();
        let eventfd = EventFd::new(0).unwrap();
        epoll.add(&eventfd, Readiness::IN, 7).unwrap();

        eventfd.write(1).unwrap();

        let mut events = Vec::with_capacity(8);
        let n = epoll.wait(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(events[0].token, 7);
        assert!(events[0].readiness.contains(Readiness::IN));
    }

    #[test]
    fn test_wait_times_out_with_no_events() {
        let epoll = Epoll::new().unwrap();
        let eventfd = EventFd::new(0).unwrap();
        epoll.add(&eventfd, Readiness::IN, 1).unwrap();

        let mut events = Vec::with_capacity(8);
        let n = epoll.wait(&mut events, Some(Duration::ZERO)).unwrap();
        assert_eq!(n, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_modify_and_remove() {
        let epoll = Epoll::new().unwrap();
        let eventfd = EventFd::new(0).unwrap();
        epoll.add(&eventfd, Readiness::IN, 1).unwrap();
        epoll.modify(&eventfd, Readiness::IN | Readiness::OUT, 2).unwrap();

        eventfd.write(1).unwrap();
        let mut events = Vec::with_capacity(8);
        epoll.wait(&mut events, Some(Duration::ZERO)).unwrap();
        assert_eq!(events[0].token, 2);

        epoll.remove(&eventfd).unwrap();
        let n = epoll.wait(&mut events, Some(Duration::ZERO)).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let epoll = Epoll::new().unwrap();
        let mut events = Vec::with_capacity(1);
        let err = epoll
            .wait(&mut events, Some(Duration::from_secs(u64::MAX)))
            .unwrap_err();
        assert_eq!(err, Errno::EINVAL);
    }
}
