//! Single-threaded poke/reply over two pipes.
//!
//! The parent sends `trials + 1` pokes. The last one only carries
//! `should_exit` and is never answered, so exactly `trials` samples are taken.

use crate::message::{self, Message};
use crate::stats::Stats;
use crate::timer::{Clock, Jitter};
use crate::{Config, Result};
use log::{debug, info};
use std::io::{Read, Write};

/// Drives the measuring side, feeding each latency into `stats`.
///
/// On error `stats` keeps whatever was measured before the failure.
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

/// Answers pokes until told to exit. Returns the number of replies sent.
pub fn child<R, W, C>(rx: &mut R, tx: &mut W, clock: &C) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    C: Clock,
{
    let mut replies = 0;
    loop {
        let should_exit = message::recv_poke(rx)?;
        let tick = clock.now();
        if should_exit {
            break;
        }
        message::send(tx, Message::PokeReply { tick })?;
        replies += 1;
    }
    debug!("child sent {} replies", replies);
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use crate::pipe::PipePair;
    use crate::timer::testing::FixedClock;
    use crate::timer::{MonotonicClock, Tick};
    use crate::Error;
    use std::io::Cursor;
    use std::thread;

    #[test]
    fn fixed_offset_replies_give_fixed_deltas() {
        const START: u64 = 1_000;
        const OFFSET: u64 = 250;

        let mut replies = Vec::new();
        for _ in 0..5 {
            message::send(
                &mut replies,
                Message::PokeReply {
                    tick: Tick::from_raw(START + OFFSET),
                },
            )
            .unwrap();
        }
        let mut rx = Cursor::new(replies);
        let mut tx = Vec::new();
        let mut stats = Stats::new();

        parent(&mut rx, &mut tx, &Config::new(5), &FixedClock(START), &mut stats).unwrap();

        let summary = stats.summary();
        assert_eq!(summary.samples, 5);
        assert_eq!((summary.min, summary.max, summary.average), (OFFSET, OFFSET, OFFSET));

        // Five measured pokes and one shutdown poke, which is not waited on.
        let mut sent = Cursor::new(tx);
        for _ in 0..5 {
            assert!(!message::recv_poke(&mut sent).unwrap());
        }
        assert!(message::recv_poke(&mut sent).unwrap());
        assert_eq!(sent.position() as usize, 6 * MessageKind::Poke.frame_len());
    }

    #[test]
    fn child_exits_on_shutdown_without_replying() {
        let mut pokes = Vec::new();
        message::send(&mut pokes, Message::Poke { should_exit: false }).unwrap();
        message::send(&mut pokes, Message::Poke { should_exit: true }).unwrap();
        message::send(&mut pokes, Message::Poke { should_exit: false }).unwrap();

        let mut rx = Cursor::new(pokes);
        let mut tx = Vec::new();
        let replies = child(&mut rx, &mut tx, &FixedClock(9)).unwrap();

        assert_eq!(replies, 1);
        assert_eq!(tx.len(), MessageKind::PokeReply.frame_len());
        // Nothing past the shutdown poke was consumed.
        assert_eq!(rx.position() as usize, 2 * MessageKind::Poke.frame_len());
    }

    #[test]
    fn parent_stops_when_child_goes_away() {
        let mut replies = Vec::new();
        for tick in [10, 20] {
            message::send(
                &mut replies,
                Message::PokeReply {
                    tick: Tick::from_raw(tick),
                },
            )
            .unwrap();
        }
        let mut stats = Stats::new();
        let result = parent(
            &mut Cursor::new(replies),
            &mut Vec::new(),
            &Config::new(4),
            &FixedClock(0),
            &mut stats,
        );

        assert!(matches!(result, Err(ref err) if err.is_peer_closed()));
        assert_eq!(stats.count(), 2);
    }

    #[test]
    fn runs_over_real_pipes() {
        let (mut parent_end, mut child_end) = PipePair::new().unwrap().split();
        let config = Config::new(100);

        let replies = thread::spawn(move || {
            child(&mut child_end.rx, &mut child_end.tx, &MonotonicClock)
        });

        let mut stats = Stats::new();
        parent(
            &mut parent_end.rx,
            &mut parent_end.tx,
            &config,
            &MonotonicClock,
            &mut stats,
        )
        .unwrap();

        assert_eq!(replies.join().unwrap().unwrap(), 100);
        assert_eq!(stats.count(), 100);

        // The child's write end is gone and nothing extra was sent.
        let mut rest = Vec::new();
        assert_eq!(parent_end.rx.read_to_end(&mut rest).unwrap(), 0);
    }

    #[test]
    fn child_reports_closed_parent() {
        let (parent_end, mut child_end) = PipePair::new().unwrap().split();
        drop(parent_end);
        let err = child(&mut child_end.rx, &mut child_end.tx, &MonotonicClock).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
