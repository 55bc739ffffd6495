//! Ties transport, fork, role and reporting together for one run.

use crate::config::Args;
use crate::handoff::{self, HandoffRegion};
use crate::pair::{self, Paired};
use crate::pipe::{Endpoint, PipePair};
use crate::stats::Stats;
use crate::timer::{self, MonotonicClock};
use crate::{getpid, logger, rendezvous, roundtrip, Config, Error, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::fmt;
use std::io;
use std::process::{self, ExitCode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// Single-threaded poke/reply over two pipes.
    Pipe,
    /// Poke/reply where the child replies from a second thread.
    PipeSignal,
    /// Unblock latency of a process-shared mutex.
    ShmUnblock,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Pipe => "pipe",
            Protocol::PipeSignal => "pipe_signal",
            Protocol::ShmUnblock => "shm_unblock",
        })
    }
}

/// Entry point shared by the binaries.
pub fn main(protocol: Protocol) -> ExitCode {
    let config = Config::from(Args::parse());
    match run(protocol, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::HandoffOrder) => {
            logger::flush();
            eprintln!("{}: {}", protocol, Error::HandoffOrder);
            process::abort();
        }
        Err(err) => {
            logger::flush();
            eprintln!("{}: {}", protocol, err);
            ExitCode::FAILURE
        }
    }
}

/// Creates the transport, forks, and runs this process's role.
///
/// Returns in both processes. The parent prints the summary and reaps the
/// child before returning.
pub fn run(protocol: Protocol, config: &Config) -> Result<()> {
    timer::init();
    pair::ignore_sigpipe()?;

    match protocol {
        Protocol::Pipe | Protocol::PipeSignal => run_pipes(protocol, config),
        Protocol::ShmUnblock => run_handoff(config),
    }
}

fn run_pipes(protocol: Protocol, config: &Config) -> Result<()> {
    let clock = MonotonicClock;

    match pair::spawn_pair(PipePair::new()?)? {
        Paired::Child(Endpoint { mut rx, mut tx }) => {
            logger::init(config.logging)?;
            info!("child PID: {}", getpid());

            let replies = match protocol {
                Protocol::PipeSignal => rendezvous::child(&mut rx, tx, &clock),
                _ => roundtrip::child(&mut rx, &mut tx, &clock),
            };
            finish_child(replies)
        }
        Paired::Parent { child, mut ends } => {
            logger::init(config.logging)?;
            info!("parent PID: {}", getpid());

            let mut stats = Stats::new();
            let measured = match protocol {
                Protocol::PipeSignal => {
                    rendezvous::parent(&mut ends.rx, &mut ends.tx, config, &clock, &mut stats)
                }
                _ => roundtrip::parent(&mut ends.rx, &mut ends.tx, config, &clock, &mut stats),
            };
            // Closing our ends lets a child still blocked on a read see EOF.
            drop(ends);
            finish_parent(child, config, &stats, measured)
        }
    }
}

fn run_handoff(config: &Config) -> Result<()> {
    let clock = MonotonicClock;

    match pair::spawn_pair(HandoffRegion::create()?)? {
        Paired::Child(region) => {
            logger::init(config.logging)?;
            info!("child PID: {}", getpid());
            finish_child(handoff::child(&region, &clock))
        }
        Paired::Parent {
            child,
            ends: region,
        } => {
            logger::init(config.logging)?;
            info!("parent PID: {}", getpid());

            let mut stats = Stats::new();
            let measured = handoff::parent(&region, config, &clock, &mut stats);
            if let Err(Error::HandoffOrder) = measured {
                return measured;
            }
            finish_parent(child, config, &stats, measured)
        }
    }
}

fn finish_child(result: Result<u64>) -> Result<()> {
    let outcome = match result {
        Ok(count) => {
            debug!("child done after {} rounds", count);
            Ok(())
        }
        Err(err) => {
            error!("child: {}", err);
            Err(err)
        }
    };
    logger::flush();
    outcome
}

fn finish_parent(child: i32, config: &Config, stats: &Stats, measured: Result<()>) -> Result<()> {
    if let Err(err) = &measured {
        error!("measurement stopped early: {}", err);
    }
    let summary = stats.summary();
    if summary.samples < config.trials as u64 {
        warn!(
            "only {} of {} iterations completed; average is over completed iterations",
            summary.samples, config.trials
        );
    }

    logger::flush();
    summary.write_report(config.trials, &mut io::stdout().lock())?;

    let reaped = pair::reap(child);
    if let Err(err) = &reaped {
        warn!("{}", err);
        logger::flush();
    }
    measured.and(reaped)
}
