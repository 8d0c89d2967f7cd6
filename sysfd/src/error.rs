use core::fmt;
use std::io;

/// An OS error number captured from `errno`.
///
/// Every syscall wrapper in this crate reports failure as an `Errno`. The
/// value is the raw error number as set by the kernel or libc; [`Errno::last`]
/// captures the calling thread's current value right after a failed call.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Errno(i32);

pub type Result<T> = core::result::Result<T, Errno>;

impl Errno {
    pub const EINTR: Errno = Errno(libc::EINTR);
    pub const EAGAIN: Errno = Errno(libc::EAGAIN);
    pub const EINVAL: Errno = Errno(libc::EINVAL);
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const ERANGE: Errno = Errno(libc::ERANGE);
    pub const EILSEQ: Errno = Errno(libc::EILSEQ);
    pub const EAFNOSUPPORT: Errno = Errno(libc::EAFNOSUPPORT);

    /// Captures the calling thread's current `errno` value.
    pub fn last() -> Errno {
        // errno is always set when a syscall reports failure; EIO is a
        // fallback for the impossible case where the OS error is missing.
        Errno(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO))
    }

    /// Creates an error number from a raw integer.
    pub const fn from_raw(raw: i32) -> Errno {
        Errno(raw)
    }

    pub const fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Errno({})", self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> io::Error {
        io::Error::from_raw_os_error(errno.as_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_roundtrip() {
        let errno = Errno::from_raw(libc::ENOENT);
        assert_eq!(errno, Errno::ENOENT);
        assert_eq!(errno.as_raw(), libc::ENOENT);
    }

    #[test]
    fn test_errno_into_io_error() {
        let err: io::Error = Errno::EINVAL.into();
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn test_errno_display_mentions_os_error() {
        let message = Errno::ENOENT.to_string();
        assert!(!message.is_empty());
    }
}
