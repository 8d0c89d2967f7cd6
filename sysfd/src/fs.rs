//! Files and whole-file convenience helpers.
use core::ops::BitOr;
use core::ops::BitOrAssign;
use std::ffi::CString;
use std::io::IoSlice;
use std::io::IoSliceMut;
use std::io::SeekFrom;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::os::unix::io::RawFd;
use std::path::Path;

use libc::c_int;

use crate::error::Errno;
use crate::error::Result;
use crate::handle::OwnedFd;
use crate::parse;
use crate::syscall;

/// Flags for [`File::open`], a bitwise combination of `O_*` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(c_int);

impl OpenFlags {
    pub const RDONLY: OpenFlags = OpenFlags(libc::O_RDONLY);
    pub const WRONLY: OpenFlags = OpenFlags(libc::O_WRONLY);
    pub const RDWR: OpenFlags = OpenFlags(libc::O_RDWR);
    pub const APPEND: OpenFlags = OpenFlags(libc::O_APPEND);
    pub const CREAT: OpenFlags = OpenFlags(libc::O_CREAT);
    pub const TRUNC: OpenFlags = OpenFlags(libc::O_TRUNC);
    pub const EXCL: OpenFlags = OpenFlags(libc::O_EXCL);
    pub const NONBLOCK: OpenFlags = OpenFlags(libc::O_NONBLOCK);
    pub const CLOEXEC: OpenFlags = OpenFlags(libc::O_CLOEXEC);

    pub const fn from_raw(raw: c_int) -> OpenFlags {
        OpenFlags(raw)
    }

    pub const fn as_raw(&self) -> c_int {
        self.0
    }

    pub fn contains(&self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// An open file descriptor obtained from `open(2)`.
///
/// The descriptor is closed when the `File` is dropped. I/O goes through the
/// kernel on every call; there is no buffering.
#[derive(Debug)]
pub struct File {
    handle: OwnedFd,
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| Errno::EINVAL)
}

impl File {
    /// Opens a file. `flags` must not include `CREAT` (use [`File::create`]
    /// or [`File::open_with`] to supply a creation mode).
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<File> {
        Self::open_with(path, flags, 0)
    }

    /// Opens and possibly creates a file with the given permission bits.
    pub fn open_with(path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> Result<File> {
        let path = path_to_cstring(path.as_ref())?;
        let fd = syscall::open(&path, flags.as_raw(), mode as libc::mode_t)?;
        Ok(File { handle: OwnedFd::from_raw(fd) })
    }

    /// Creates or truncates a file for writing, mode `0o666` before umask.
    pub fn create(path: impl AsRef<Path>) -> Result<File> {
        Self::open_with(
            path,
            OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC,
            0o666,
        )
    }

    /// Wraps an already-open descriptor.
    pub fn from_handle(handle: OwnedFd) -> File {
        File { handle }
    }

    pub fn handle(&self) -> &OwnedFd {
        &self.handle
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        syscall::read(self.handle.get(), buf)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        syscall::write(self.handle.get(), buf)
    }

    /// Scatter read into multiple buffers with a single `readv(2)` call.
    pub fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> Result<usize> {
        syscall::readv(self.handle.get(), bufs)
    }

    /// Gather write from multiple buffers with a single `writev(2)` call.
    pub fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        syscall::writev(self.handle.get(), bufs)
    }

    /// Moves the file offset, returning the new absolute position.
    pub fn seek(&self, pos: SeekFrom) -> Result<u64> {
        let (offset, whence) = match pos {
            SeekFrom::Start(offset) => {
                let offset = offset.try_into().map_err(|_| Errno::EINVAL)?;
                (offset, libc::SEEK_SET)
            }
            SeekFrom::Current(offset) => (offset, libc::SEEK_CUR),
            SeekFrom::End(offset) => (offset, libc::SEEK_END),
        };
        syscall::lseek(self.handle.get(), offset, whence)
    }

    /// Returns the descriptor's status flags (`F_GETFL`).
    pub fn flags(&self) -> Result<OpenFlags> {
        let raw = syscall::fcntl(self.handle.get(), libc::F_GETFL, 0)?;
        Ok(OpenFlags::from_raw(raw))
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
}

impl AsRawFd for File {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.get()
    }
}

/// Reads the contents of a file into a byte vector.
///
/// The length of some files (notably procfs and sysfs entries, or pipes)
/// cannot be determined in advance, so this reads into a dynamically-doubling
/// buffer until the kernel reports end of file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let file = File::open(path, OpenFlags::RDONLY | OpenFlags::CLOEXEC)?;

    let mut contents = vec![0u8; 32];
    let mut size = 0;
    loop {
        let n = file.read(&mut contents[size..])?;
        if n == 0 {
            break;
        }
        size += n;
        if size == contents.len() {
            let doubled = contents.len() * 2;
            contents.resize(doubled, 0);
        }
    }

    contents.truncate(size);
    Ok(contents)
}

/// Reads the contents of a file as a string.
///
/// Fails with `EILSEQ` if the contents are not valid UTF-8.
pub fn read_file_as_string(path: impl AsRef<Path>) -> Result<String> {
    String::from_utf8(read_file(path)?).map_err(|_| Errno::EILSEQ)
}

/// Reads a file as a string with trailing whitespace removed.
///
/// The usual way to read single-value procfs/sysfs entries, which end with a
/// newline.
pub fn slurp(path: impl AsRef<Path>) -> Result<String> {
    let mut contents = read_file_as_string(path)?;
    contents.truncate(parse::rtrim(&contents).len());
    Ok(contents)
}

/// Writes `contents` to a file, creating or truncating it.
pub fn spew(path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
    let file = File::create(path)?;
    let mut remaining = contents.as_ref();
    while !remaining.is_empty() {
        let n = file.write(remaining)?;
        remaining = &remaining[n..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let err = File::open("/nonexistent/sysfd-test", OpenFlags::RDONLY).unwrap_err();
        assert_eq!(err, Errno::ENOENT);
    }

    #[test]
    fn test_spew_then_slurp_trims_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value");
        spew(&path, "42\n").unwrap();
        assert_eq!(slurp(&path).unwrap(), "42");
        assert_eq!(read_file_as_string(&path).unwrap(), "42\n");
    }

    #[test]
    fn test_read_file_larger_than_initial_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big");
        let data = vec![b'x'; 1000];
        spew(&path, &data).unwrap();
        assert_eq!(read_file(&path).unwrap(), data);
    }

    #[test]
    fn test_seek_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seek");
        spew(&path, "0123456789").unwrap();

        let file = File::open(&path, OpenFlags::RDONLY).unwrap();
        assert_eq!(file.seek(SeekFrom::Start(4)).unwrap(), 4);

        let mut buf = [0u8; 3];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"456");

        assert_eq!(file.seek(SeekFrom::Current(-2)).unwrap(), 5);
        assert_eq!(file.seek(SeekFrom::End(-1)).unwrap(), 9);
    }

    #[test]
    fn test_vectored_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectored");

        let file = File::open_with(
            &path,
            OpenFlags::RDWR | OpenFlags::CREAT,
            0o644,
        )
        .unwrap();
        let written = file
            .write_vectored(&[IoSlice::new(b"scatter "), IoSlice::new(b"gather")])
            .unwrap();
        assert_eq!(written, 14);

        file.seek(SeekFrom::Start(0)).unwrap();
        let mut first = [0u8; 8];
        let mut second = [0u8; 6];
        let read = file
            .read_vectored(&mut [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)])
            .unwrap();
        assert_eq!(read, 14);
        assert_eq!(&first, b"scatter ");
        assert_eq!(&second, b"gather");
    }

    #[test]
    fn test_set_nonblocking_updates_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags");
        spew(&path, "x").unwrap();

        let file = File::open(&path, OpenFlags::RDONLY).unwrap();
        assert!(!file.flags().unwrap().contains(OpenFlags::NONBLOCK));
        file.set_nonblocking(true).unwrap();
        assert!(file.flags().unwrap().contains(OpenFlags::NONBLOCK));
        file.set_nonblocking(false).unwrap();
        assert!(!file.flags().unwrap().contains(OpenFlags::NONBLOCK));
    }
}
