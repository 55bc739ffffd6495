use crate::pair::Transport;
use crate::raw::RawFd;
use crate::Result;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd as Fd};

#[derive(Debug)]
pub struct PipeReader(RawFd);
#[derive(Debug)]
pub struct PipeWriter(RawFd);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> Fd {
        self.0.as_raw_fd()
    }
}

impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> Fd {
        self.0.as_raw_fd()
    }
}

pub fn pipe() -> Result<(PipeReader, PipeWriter)> {
    unsafe {
        let mut fds: [libc::c_int; 2] = [0, 0];
        let ret = libc::pipe(fds.as_mut_ptr());
        if ret == -1 {
            return_errno!("pipe");
        }
        Ok((PipeReader(RawFd(fds[0])), PipeWriter(RawFd(fds[1]))))
    }
}

/// One side's view of a [`PipePair`]: where it reads and where it writes.
#[derive(Debug)]
pub struct Endpoint {
    pub rx: PipeReader,
    pub tx: PipeWriter,
}

/// Two unidirectional pipes.
///
/// `poke` carries parent -> child traffic, `reply` carries child -> parent.
#[derive(Debug)]
pub struct PipePair {
    poke: (PipeReader, PipeWriter),
    reply: (PipeReader, PipeWriter),
}

impl PipePair {
    pub fn new() -> Result<PipePair> {
        let poke = pipe()?;
        let reply = pipe()?;
        Ok(PipePair { poke, reply })
    }

    /// Splits into `(parent, child)` endpoints without forking.
    pub fn split(self) -> (Endpoint, Endpoint) {
        let (poke_rx, poke_tx) = self.poke;
        let (reply_rx, reply_tx) = self.reply;
        (
            Endpoint {
                rx: reply_rx,
                tx: poke_tx,
            },
            Endpoint {
                rx: poke_rx,
                tx: reply_tx,
            },
        )
    }
}

// Each side must close the ends it does not own, otherwise the peer never
// sees end-of-stream once this side is gone.
impl Transport for PipePair {
    type Parent = Endpoint;
    type Child = Endpoint;

    fn into_parent(self) -> Endpoint {
        let (parent, _child) = self.split();
        parent
    }

    fn into_child(self) -> Endpoint {
        let (_parent, child) = self.split();
        child
    }
}
