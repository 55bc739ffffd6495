//! Poke/reply where the child's reply comes from a second thread.
//!
//! The child's main thread reads pokes off the pipe and hands each one to a
//! reply thread through a single-slot rendezvous. The reply thread stamps the
//! tick after it has been woken, so the measured latency includes that extra
//! scheduling hop, the way an asynchronous signal handler would.
//!
//! The slot cycles through these phases, all transitions made under one
//! mutex:
//!
//! ```text
//! Idle --reply thread--> Armed --main: poke--> Poked --reply thread--> Armed ...
//!                          \--main: exit poke or failure--> Exiting
//! ```
//!
//! Only one of the two threads is ever runnable at a time.

use crate::message::{self, Message};
use crate::stats::Stats;
use crate::timer::{Clock, Jitter};
use crate::{Config, Error, Result};
use log::{debug, info, warn};
use std::io::{Read, Write};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The reply thread has not started yet.
    Idle,
    /// The reply thread is waiting for the next poke.
    Armed,
    /// A poke arrived; the reply thread owes exactly one reply.
    Poked,
    Exiting,
}

struct Slot<W> {
    phase: Phase,
    // Shared by both threads: `Ready` from the main thread, `PokeReply` from
    // the reply thread. Only written with the slot locked.
    tx: W,
    replies: u64,
}

pub struct Rendezvous<W> {
    slot: Mutex<Slot<W>>,
    cv: Condvar,
}

impl<W: Write> Rendezvous<W> {
    pub fn new(tx: W) -> Rendezvous<W> {
        Rendezvous {
            slot: Mutex::new(Slot {
                phase: Phase::Idle,
                tx,
                replies: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    fn lock(&self) -> MutexGuard<'_, Slot<W>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a, F>(&self, guard: MutexGuard<'a, Slot<W>>, condition: F) -> MutexGuard<'a, Slot<W>>
    where
        F: FnMut(&mut Slot<W>) -> bool,
    {
        self.cv
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of the reply thread. Returns the number of replies written.
    pub fn reply_loop<C: Clock>(&self, clock: &C) -> Result<u64> {
        let mut slot = self.lock();
        loop {
            slot.phase = Phase::Armed;
            self.cv.notify_one();

            slot = self.wait_while(slot, |s| s.phase == Phase::Armed);
            let tick = clock.now();

            if slot.phase == Phase::Exiting {
                return Ok(slot.replies);
            }

            if let Err(err) = message::send(&mut slot.tx, Message::PokeReply { tick }) {
                slot.phase = Phase::Exiting;
                self.cv.notify_one();
                return Err(err);
            }
            slot.replies += 1;
        }
    }

    /// Body of the child's main thread: announce readiness, take a poke,
    /// hand it over. Returns once the parent asks to exit, or with the first
    /// I/O error after telling the reply thread to stop.
    pub fn dispatch_loop<R: Read + ?Sized>(&self, rx: &mut R) -> Result<()> {
        loop {
            let mut slot = self.lock();
            slot = self.wait_while(slot, |s| matches!(s.phase, Phase::Idle | Phase::Poked));
            if slot.phase == Phase::Exiting {
                // The reply thread gave up; its error is reported on join.
                return Ok(());
            }

            let received = message::send(&mut slot.tx, Message::Ready)
                .and_then(|()| message::recv_poke(rx));

            match received {
                Ok(false) => slot.phase = Phase::Poked,
                Ok(true) => {
                    slot.phase = Phase::Exiting;
                    self.cv.notify_one();
                    return Ok(());
                }
                Err(err) => {
                    slot.phase = Phase::Exiting;
                    self.cv.notify_one();
                    return Err(err);
                }
            }
            self.cv.notify_one();
        }
    }
}

/// Drives the measuring side. Before every poke, including the final
/// shutdown poke, waits for the child to report its reply thread armed.
pub fn parent<R, W, C>(
    rx: &mut R,
    tx: &mut W,
    config: &Config,
    clock: &C,
    stats: &mut Stats,
) -> Result<()>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    C: Clock,
{
    let mut jitter = Jitter::new(config.random_sleep);

    for i in 0..=config.trials {
        let should_exit = i == config.trials;

        jitter.pause();

        message::recv_ready(rx)?;

        let start = clock.now();
        message::send(tx, Message::Poke { should_exit })?;
        if should_exit {
            break;
        }

        let reply = message::recv_reply(rx)?;
        let nanos = clock.nanos_between(start, reply);
        info!("{} nanoseconds", nanos);
        stats.record(nanos);
    }
    Ok(())
}

/// Runs the child's two threads until the parent's shutdown poke. Returns
/// the number of replies sent.
pub fn child<R, W, C>(rx: &mut R, tx: W, clock: &C) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + Send,
    C: Clock,
{
    let rendezvous = Rendezvous::new(tx);

    thread::scope(|s| {
        let replier = thread::Builder::new()
            .name("reply".into())
            .spawn_scoped(s, || rendezvous.reply_loop(clock))?;

        let dispatched = rendezvous.dispatch_loop(rx);
        let replied = replier.join().map_err(|_| Error::ReplyThread)?;

        if let Err(err) = &dispatched {
            warn!("child stopped reading pokes: {}", err);
        }
        dispatched?;
        let replies = replied?;
        debug!("reply thread sent {} replies", replies);
        Ok(replies)
    })
}
