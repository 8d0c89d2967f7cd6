//! RAII wrappers for Linux kernel resources.
//!
//! Every resource this crate hands out — file descriptors, sockets, epoll
//! instances, event and timer descriptors, memory mappings, the interface
//! address list — is owned by a move-only [`Handle`] that releases it
//! exactly once, no matter how control leaves the scope. The wrappers are
//! deliberate 1:1 pass-throughs: one method, one syscall, failures reported
//! as the [`Errno`] the kernel set. There is no buffering, no event loop and
//! no retry logic on top.
//!
//! All raw libc calls live in [`syscall`]; the typed modules above it are
//! safe.
#[cfg(not(target_os = "linux"))]
compile_error!("sysfd only supports Linux.");

pub mod error;
pub mod event;
pub mod fs;
pub mod handle;
pub mod ifaddrs;
pub mod mmap;
pub mod net;
pub mod parse;
pub mod poll;
pub mod syscall;
pub mod timer;

pub use error::Errno;
pub use error::Result;
pub use handle::Handle;
pub use handle::OwnedFd;
pub use handle::Resource;
