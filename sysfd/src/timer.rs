//! Timer descriptors.
use core::ops::BitOr;
use core::time::Duration;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use libc::c_int;

use crate::error::Errno;
use crate::error::Result;
use crate::handle::OwnedFd;
use crate::syscall;

/// The clock a [`TimerFd`] measures against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    Monotonic,
    Realtime,
    Boottime,
}

impl ClockId {
    pub const fn as_raw(&self) -> c_int {
        match self {
            ClockId::Monotonic => libc::CLOCK_MONOTONIC,
            ClockId::Realtime => libc::CLOCK_REALTIME,
            ClockId::Boottime => libc::CLOCK_BOOTTIME,
        }
    }
}

/// Flags for [`TimerFd::new_with_flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFlags(c_int);

impl TimerFlags {
    pub const NONBLOCK: TimerFlags = TimerFlags(libc::TFD_NONBLOCK);
    pub const CLOEXEC: TimerFlags = TimerFlags(libc::TFD_CLOEXEC);

    pub const fn as_raw(&self) -> c_int {
        self.0
    }
}

impl BitOr for TimerFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        TimerFlags(self.0 | rhs.0)
    }
}

fn duration_to_timespec(duration: Duration) -> Result<libc::timespec> {
    Ok(libc::timespec {
        tv_sec: duration.as_secs().try_into().map_err(|_| Errno::EINVAL)?,
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    })
}

fn timespec_to_duration(ts: libc::timespec) -> Duration {
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

/// A `timerfd_create(2)` timer.
///
/// Expirations are delivered by making the descriptor readable, so a timer
/// plugs into an [`Epoll`](crate::poll::Epoll) like any other descriptor.
pub struct TimerFd {
    handle: OwnedFd,
}

impl TimerFd {
    /// Creates a disarmed timer on the given clock, close-on-exec.
    pub fn new(clock: ClockId) -> Result<TimerFd> {
        Self::new_with_flags(clock, TimerFlags::CLOEXEC)
    }

    pub fn new_with_flags(clock: ClockId, flags: TimerFlags) -> Result<TimerFd> {
        let fd = syscall::timerfd_create(clock.as_raw(), flags.as_raw())?;
        Ok(TimerFd { handle: OwnedFd::from_raw(fd) })
    }

    pub fn from_handle(handle: OwnedFd) -> TimerFd {
        TimerFd { handle }
    }

    pub fn handle(&self) -> &OwnedFd {
        &self.handle
    }

    /// Arms the timer to expire after `initial` and then every `interval`.
    ///
    /// A zero `initial` disarms the timer; a zero `interval` makes it
    /// one-shot. Returns the previous (time until expiration, interval)
    /// pair.
    pub fn set(&self, initial: Duration, interval: Duration) -> Result<(Duration, Duration)> {
        let new_value = libc::itimerspec {
            it_interval: duration_to_timespec(interval)?,
            it_value: duration_to_timespec(initial)?,
        };
        let old_value = syscall::timerfd_settime(self.handle.get(), 0, &new_value)?;
        Ok((
            timespec_to_duration(old_value.it_value),
            timespec_to_duration(old_value.it_interval),
        ))
    }

    /// Disarms the timer, returning the previous state as [`set`](TimerFd::set) does.
    pub fn disarm(&self) -> Result<(Duration, Duration)> {
        self.set(Duration::ZERO, Duration::ZERO)
    }

    /// Returns the current (time until expiration, interval) pair.
    pub fn get(&self) -> Result<(Duration, Duration)> {
        let curr_value = syscall::timerfd_gettime(self.handle.get())?;
        Ok((
            timespec_to_duration(curr_value.it_value),
            timespec_to_duration(curr_value.it_interval),
        ))
    }

    /// Reads the number of expirations since the last read, blocking until
    /// at least one has occurred.
    pub fn read(&self) -> Result<u64> {
        let mut buf = [0u8; 8];
        let n = syscall::read(self.handle.get(), &mut buf)?;
        if n != buf.len() {
            return Err(Errno::EINVAL);
        }
        Ok(u64::from_ne_bytes(buf))
    }
}

impl AsRawFd for TimerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.get()
    }
}
