use crate::message::MessageKind;
use crate::Result;
use cfg_if::cfg_if;
use std::ffi::CStr;
use std::io;
use std::str::Utf8Error;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("UTF8 string error: {0}")]
    Utf8(#[from] Utf8Error),

    #[error("errno: {0}, msg: {1}")]
    Errno(libc::c_int, String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected message: expected {expected:?}, got tag {found}")]
    UnexpectedMessage { expected: MessageKind, found: i32 },

    #[error("child acquire time recorded without a parent release time")]
    HandoffOrder,

    #[error("child process failed with status {0}")]
    ChildFailed(i32),

    #[error("reply thread panicked")]
    ReplyThread,

    #[error("logger error: {0}")]
    Logger(String),
}

impl Error {
    pub fn errno(&self) -> Option<libc::c_int> {
        match self {
            Error::Errno(errno, _) => Some(*errno),
            Error::Io(err) => err.raw_os_error(),
            _ => None,
        }
    }

    /// True when the error means the peer went away (closed its end of a pipe).
    pub fn is_peer_closed(&self) -> bool {
        match self {
            Error::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::WriteZero
            ),
            _ => false,
        }
    }
}

pub(crate) fn libc_errno() -> libc::c_int {
    cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            unsafe { *libc::__errno_location() }
        } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
            unsafe { *libc::__error() }
        } else {
            io::Error::last_os_error().raw_os_error().unwrap_or(0)
        }
    }
}

pub(crate) fn strerror(errno: i32) -> Result<String> {
    unsafe {
        let cstr = CStr::from_ptr(libc::strerror(errno as _));
        Ok(cstr.to_str()?.to_string())
    }
}

/// Returns `Error::Errno` built from the thread's current `errno`.
macro_rules! return_errno {
    ($msg: expr) => {{
        let errno = $crate::errors::libc_errno();
        return Err($crate::Error::Errno(
            errno,
            format!("{}: {}", $msg, $crate::errors::strerror(errno)?),
        ));
    }};
}

/// Same as `return_errno!` for the pthread family, which returns the error
/// code instead of setting `errno`.
macro_rules! check_code {
    ($code: expr, $msg: expr) => {{
        let code = $code;
        if code != 0 {
            return Err($crate::Error::Errno(
                code,
                format!("{}: {}", $msg, $crate::errors::strerror(code)?),
            ));
        }
    }};
}
