use crate::errors::libc_errno;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd as Fd};

/// Owned file descriptor, closed on drop.
#[derive(Debug)]
pub(crate) struct RawFd(pub(crate) libc::c_int);

impl Read for RawFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        inner_read(self.0, buf)
    }
}

impl Write for RawFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        inner_write(self.0, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for RawFd {
    fn as_raw_fd(&self) -> Fd {
        self.0
    }
}

impl Drop for RawFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

// EINTR comes back as `ErrorKind::Interrupted`, which read_exact and
// write_all already retry.
fn inner_read(fd: libc::c_int, buf: &mut [u8]) -> io::Result<usize> {
    unsafe {
        let n = libc::read(fd, buf.as_mut_ptr() as _, buf.len() as _);
        if n == -1 {
            return Err(io::Error::from_raw_os_error(libc_errno() as _));
        }
        Ok(n as _)
    }
}

fn inner_write(fd: libc::c_int, buf: &[u8]) -> io::Result<usize> {
    unsafe {
        let n = libc::write(fd, buf.as_ptr() as _, buf.len() as _);
        if n == -1 {
            return Err(io::Error::from_raw_os_error(libc_errno() as _));
        }
        Ok(n as _)
    }
}
