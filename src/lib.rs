#[macro_use]
mod errors;

pub mod config;
pub mod handoff;
pub mod harness;
pub mod logger;
pub mod message;
pub mod mutex;
pub mod pair;
pub mod pipe;
pub(crate) mod raw;
pub mod rendezvous;
pub mod roundtrip;
pub mod shm;
pub mod stats;
pub mod timer;

pub use config::Config;
pub use errors::Error;
pub use harness::Protocol;
pub type Result<T> = std::result::Result<T, Error>;

pub fn fork() -> Result<i32> {
    unsafe {
        let pid = libc::fork();
        if pid == -1 {
            return_errno!("fork");
        }
        Ok(pid)
    }
}

pub fn getpid() -> i32 {
    unsafe { libc::getpid() }
}

pub fn waitpid(pid: i32, options: libc::c_int) -> Result<(i32, libc::c_int)> {
    unsafe {
        let mut status: libc::c_int = 0;
        loop {
            let ret = libc::waitpid(pid as _, &mut status, options);
            if ret != -1 {
                return Ok((ret, status));
            }
            if errors::libc_errno() != libc::EINTR {
                return_errno!("waitpid");
            }
        }
    }
}
