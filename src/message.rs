//! Fixed-size frames exchanged over the pipes.
//!
//! There is no length prefix: the receiver always knows which kind it expects
//! next and reads exactly that many bytes. Layout is native-endian `#[repr(C)]`
//! style, both processes being the same binary on the same host:
//!
//! ```text
//! Ready      [tag: i32]                                   4 bytes
//! Poke       [tag: i32][should_exit: i32]                 8 bytes
//! PokeReply  [tag: i32][pad: 4][tick: u64]               16 bytes
//! ```

use crate::timer::Tick;
use crate::{Error, Result};
use std::io::{Read, Write};

const MAX_FRAME: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum MessageKind {
    Ready = 1,
    Poke = 2,
    PokeReply = 3,
}

impl MessageKind {
    pub const fn frame_len(self) -> usize {
        match self {
            MessageKind::Ready => 4,
            MessageKind::Poke => 8,
            MessageKind::PokeReply => 16,
        }
    }

    pub fn from_tag(tag: i32) -> Option<MessageKind> {
        match tag {
            1 => Some(MessageKind::Ready),
            2 => Some(MessageKind::Poke),
            3 => Some(MessageKind::PokeReply),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    /// Child's reply thread is armed; the parent may poke.
    Ready,
    Poke { should_exit: bool },
    PokeReply { tick: Tick },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ready => MessageKind::Ready,
            Message::Poke { .. } => MessageKind::Poke,
            Message::PokeReply { .. } => MessageKind::PokeReply,
        }
    }

    fn encode(&self, buf: &mut [u8; MAX_FRAME]) -> usize {
        let kind = self.kind();
        buf[..4].copy_from_slice(&(kind as i32).to_ne_bytes());
        match self {
            Message::Ready => {}
            Message::Poke { should_exit } => {
                buf[4..8].copy_from_slice(&(*should_exit as i32).to_ne_bytes());
            }
            Message::PokeReply { tick } => {
                buf[4..8].fill(0);
                buf[8..16].copy_from_slice(&tick.raw().to_ne_bytes());
            }
        }
        kind.frame_len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        let mut buf = [0u8; MAX_FRAME];
        let len = self.encode(&mut buf);
        w.write_all(&buf[..len])?;
        Ok(())
    }

    /// Reads exactly one frame of kind `expected`.
    pub fn read_from<R: Read + ?Sized>(r: &mut R, expected: MessageKind) -> Result<Message> {
        let frame = read_frame(r, expected)?;
        Ok(match expected {
            MessageKind::Ready => Message::Ready,
            MessageKind::Poke => Message::Poke {
                should_exit: exit_flag(&frame),
            },
            MessageKind::PokeReply => Message::PokeReply {
                tick: reply_tick(&frame),
            },
        })
    }
}

fn read_frame<R: Read + ?Sized>(r: &mut R, expected: MessageKind) -> Result<[u8; MAX_FRAME]> {
    let mut buf = [0u8; MAX_FRAME];
    r.read_exact(&mut buf[..expected.frame_len()])?;

    let tag = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
    if tag != expected as i32 {
        return Err(Error::UnexpectedMessage {
            expected,
            found: tag,
        });
    }
    Ok(buf)
}

fn exit_flag(frame: &[u8; MAX_FRAME]) -> bool {
    i32::from_ne_bytes([frame[4], frame[5], frame[6], frame[7]]) != 0
}

fn reply_tick(frame: &[u8; MAX_FRAME]) -> Tick {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&frame[8..16]);
    Tick::from_raw(u64::from_ne_bytes(raw))
}

pub fn send<W: Write + ?Sized>(w: &mut W, msg: Message) -> Result<()> {
    msg.write_to(w)
}

pub fn recv_ready<R: Read + ?Sized>(r: &mut R) -> Result<()> {
    read_frame(r, MessageKind::Ready)?;
    Ok(())
}

/// Returns the poke's `should_exit` flag.
pub fn recv_poke<R: Read + ?Sized>(r: &mut R) -> Result<bool> {
    Ok(exit_flag(&read_frame(r, MessageKind::Poke)?))
}

pub fn recv_reply<R: Read + ?Sized>(r: &mut R) -> Result<Tick> {
    Ok(reply_tick(&read_frame(r, MessageKind::PokeReply)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    #[test]
    fn frames_have_fixed_sizes() {
        let mut out = Vec::new();
        send(&mut out, Message::Ready).unwrap();
        assert_eq!(out.len(), 4);
        send(&mut out, Message::Poke { should_exit: true }).unwrap();
        assert_eq!(out.len(), 12);
        send(
            &mut out,
            Message::PokeReply {
                tick: Tick::from_raw(42),
            },
        )
        .unwrap();
        assert_eq!(out.len(), 28);

        let mut r = Cursor::new(out);
        recv_ready(&mut r).unwrap();
        assert!(recv_poke(&mut r).unwrap());
        assert_eq!(recv_reply(&mut r).unwrap(), Tick::from_raw(42));
        assert_eq!(r.position(), 28);
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let mut out = Vec::new();
        send(
            &mut out,
            Message::PokeReply {
                tick: Tick::from_raw(1),
            },
        )
        .unwrap();
        match recv_poke(&mut Cursor::new(out)) {
            Err(Error::UnexpectedMessage { expected, found }) => {
                assert_eq!(expected, MessageKind::Poke);
                assert_eq!(MessageKind::from_tag(found), Some(MessageKind::PokeReply));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn truncated_frame_is_an_io_error() {
        let mut out = Vec::new();
        send(&mut out, Message::Poke { should_exit: false }).unwrap();
        out.truncate(6);
        match recv_poke(&mut Cursor::new(out)) {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn partial_reads_are_reassembled() {
        let mut data = Vec::new();
        send(
            &mut data,
            Message::PokeReply {
                tick: Tick::from_raw(0xdead_beef),
            },
        )
        .unwrap();
        let mut r = Trickle {
            data,
            pos: 0,
            step: 3,
        };
        assert_eq!(recv_reply(&mut r).unwrap(), Tick::from_raw(0xdead_beef));
    }
}
