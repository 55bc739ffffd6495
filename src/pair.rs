//! Splitting one process into a parent/child pair that share a transport.

use crate::{fork, waitpid, Error, Result};
use log::debug;

/// Resources created before the fork and divided between the two roles.
///
/// Each conversion drops whatever the role does not own, so that a side
/// blocked on a read sees end-of-stream once its peer is gone.
pub trait Transport: Sized {
    type Parent;
    type Child;

    fn into_parent(self) -> Self::Parent;
    fn into_child(self) -> Self::Child;
}

#[derive(Debug)]
pub enum Paired<P, C> {
    Parent { child: i32, ends: P },
    Child(C),
}

/// Forks, handing each process its share of `transport`.
///
/// The caller must not have other threads running: only the forking thread
/// exists in the child.
pub fn spawn_pair<T: Transport>(transport: T) -> Result<Paired<T::Parent, T::Child>> {
    match fork()? {
        0 => Ok(Paired::Child(transport.into_child())),
        pid => {
            debug!("forked child {}", pid);
            Ok(Paired::Parent {
                child: pid,
                ends: transport.into_parent(),
            })
        }
    }
}

/// Waits for `child` and turns anything but a clean exit into an error.
pub fn reap(child: i32) -> Result<()> {
    let (_, status) = waitpid(child, 0)?;
    if libc::WIFEXITED(status) {
        match libc::WEXITSTATUS(status) {
            0 => Ok(()),
            code => Err(Error::ChildFailed(code)),
        }
    } else if libc::WIFSIGNALED(status) {
        Err(Error::ChildFailed(128 + libc::WTERMSIG(status)))
    } else {
        Err(Error::ChildFailed(status))
    }
}

/// Makes writes to a closed pipe fail with `EPIPE` instead of killing us.
pub fn ignore_sigpipe() -> Result<()> {
    unsafe {
        if libc::signal(libc::SIGPIPE, libc::SIG_IGN) == libc::SIG_ERR {
            return_errno!("signal");
        }
    }
    Ok(())
}
