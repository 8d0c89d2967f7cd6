//! Move-only ownership of raw kernel resources.
use core::mem;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;

use log::debug;
use log::trace;

use crate::syscall;

/// A raw resource representation that a [`Handle`] can own.
///
/// The raw value must be freely copyable and comparable; the handle tells an
/// owned resource apart from "nothing" by comparing against [`CLOSED`].
///
/// [`release`] is fixed per resource kind, not per handle instance. It must
/// tolerate being called with any value a wrapper constructor accepted, and it
/// has no way to report failure: a release happens at drop time, where there
/// is no caller to propagate an error to. Implementations log and discard
/// release failures.
///
/// [`CLOSED`]: Resource::CLOSED
/// [`release`]: Resource::release
pub trait Resource: Copy + Eq {
    /// The distinguished value meaning "no resource owned".
    const CLOSED: Self;

    /// Releases a non-[`CLOSED`](Resource::CLOSED) resource value.
    fn release(self);
}

/// Exclusive ownership of one raw resource value.
///
/// A handle holds either [`Resource::CLOSED`] (empty) or a value previously
/// returned by an acquisition call (owning). The resource is released exactly
/// once: when the owning handle is dropped, explicitly [`close`]d, or
/// overwritten by assignment. [`into_raw`] hands the raw value back to the
/// caller without releasing it.
///
/// Handles are move-only. There is no `Clone`: duplicating a handle would
/// allow the same resource value to be released twice. Moving a handle
/// transfers ownership and statically invalidates the source, so no sentinel
/// swap is observable from safe code.
///
/// A handle never fails. Acquisition errors belong to whatever produced the
/// raw value, and must be surfaced before a handle is constructed; a
/// constructed handle is always either empty or validly owning.
///
/// Raw-value escape is explicit only: use [`get`], [`is_open`] or
/// [`into_raw`]. The handle deliberately has no implicit conversion to the
/// raw value or to `bool`.
///
/// [`close`]: Handle::close
/// [`get`]: Handle::get
/// [`is_open`]: Handle::is_open
/// [`into_raw`]: Handle::into_raw
pub struct Handle<R: Resource>(R);

impl<R: Resource> Handle<R> {
    /// Creates a handle which does not own a resource.
    pub const fn closed() -> Handle<R> {
        Handle(R::CLOSED)
    }

    /// Creates a handle owning `raw`.
    ///
    /// Ownership is assumed, not acquired: `raw` must come from a successful
    /// acquisition call, and the caller must not use it afterwards.
    pub const fn from_raw(raw: R) -> Handle<R> {
        Handle(raw)
    }

    /// Returns the owned resource value, or the closed sentinel.
    pub fn get(&self) -> R {
        self.0
    }

    /// Returns `true` if this handle owns a resource.
    pub fn is_open(&self) -> bool {
        self.0 != R::CLOSED
    }

    /// Releases the owned resource now, if any.
    ///
    /// The handle is empty afterwards. Closing an empty handle does nothing.
    pub fn close(&mut self) {
        let raw = mem::replace(&mut self.0, R::CLOSED);
        if raw != R::CLOSED {
            R::release(raw);
        }
    }

    /// Relinquishes ownership without releasing.
    ///
    /// Returns the raw value (or the closed sentinel); the caller becomes
    /// responsible for releasing it.
    pub fn into_raw(mut self) -> R {
        mem::replace(&mut self.0, R::CLOSED)
    }
}

impl<R: Resource> Drop for Handle<R> {
    fn drop(&mut self) {
        self.close();
    }
}

impl Resource for RawFd {
    const CLOSED: RawFd = -1;

    fn release(self) {
        trace!("closing fd {}", self);
        if let Err(errno) = syscall::close(self) {
            debug!("failed to close fd {}: {}", self, errno);
        }
    }
}

/// An owned file descriptor, closed with `close(2)` on drop.
pub type OwnedFd = Handle<RawFd>;

impl AsRawFd for OwnedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.get()
    }
}

impl core::fmt::Debug for OwnedFd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "OwnedFd({})", self.get())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    thread_local! {
        static RELEASED: RefCell<Vec<i32>> = const { RefCell::new(Vec::new()) };
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Token(i32);

    impl Resource for Token {
        const CLOSED: Token = Token(-1);

        fn release(self) {
            RELEASED.with(|r| r.borrow_mut().push(self.0));
        }
    }

    fn released() -> Vec<i32> {
        RELEASED.with(|r| r.borrow().clone())
    }

    fn move_through(handle: Handle<Token>) -> Handle<Token> {
        handle
    }

    #[test]
    fn test_drop_releases_once() {
        let handle = Handle::from_raw(Token(7));
        let handle = move_through(handle);
        let handle = move_through(handle);
        assert_eq!(handle.get(), Token(7));
        assert!(handle.is_open());
        drop(handle);
        assert_eq!(released(), vec![7]);
    }

    #[test]
    fn test_move_chain_releases_once() {
        let mut handles = Vec::new();
        handles.push(Handle::from_raw(Token(7)));
        let handle = handles.pop().unwrap();
        let mut slot = Handle::closed();
        slot = move_through(handle);
        assert_eq!(slot.get(), Token(7));
        drop(slot);
        assert_eq!(released(), vec![7]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut handle = Handle::from_raw(Token(3));
        handle.close();
        handle.close();
        assert!(!handle.is_open());
        drop(handle);
        assert_eq!(released(), vec![3]);
    }

    #[test]
    fn test_close_on_empty_is_noop() {
        let mut handle = Handle::<Token>::closed();
        assert!(!handle.is_open());
        assert_eq!(handle.get(), Token::CLOSED);
        handle.close();
        drop(handle);
        assert_eq!(released(), Vec::<i32>::new());
    }

    #[test]
    fn test_into_raw_suppresses_release() {
        let handle = Handle::from_raw(Token(5));
        let raw = handle.into_raw();
        assert_eq!(raw, Token(5));
        assert_eq!(released(), Vec::<i32>::new());
    }

    #[test]
    fn test_into_raw_on_empty_returns_sentinel() {
        let handle = Handle::<Token>::closed();
        assert_eq!(handle.into_raw(), Token::CLOSED);
        assert_eq!(released(), Vec::<i32>::new());
    }

    #[test]
    fn test_overwrite_releases_old_value() {
        let mut handle = Handle::from_raw(Token(1));
        handle = Handle::from_raw(Token(2));
        assert_eq!(released(), vec![1]);
        assert_eq!(handle.get(), Token(2));
        drop(handle);
        assert_eq!(released(), vec![1, 2]);
    }

    #[test]
    fn test_swap_does_not_release() {
        let mut first = Handle::from_raw(Token(1));
        let mut second = Handle::from_raw(Token(2));
        mem::swap(&mut first, &mut second);
        assert_eq!(first.get(), Token(2));
        assert_eq!(second.get(), Token(1));
        assert_eq!(released(), Vec::<i32>::new());
        drop(first);
        drop(second);
        assert_eq!(released(), vec![2, 1]);
    }
}
