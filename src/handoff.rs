//! Unblock latency of a process-shared mutex.
//!
//! Parent and child share one mapping holding two mutexes. The parent stamps
//! a release time while holding A; the child, blocked on A, stamps its
//! acquire time once it gets in. The difference is the handoff latency.
//!
//! B exists only so the parent cannot drop A and immediately take it again
//! before the child had a chance to run: the child queues on B, then A,
//! while the parent gives up B only after it already holds A.
//!
//! ```text
//! parent:                       child:
//!   lock B                        loop:
//!   loop:                           lock B
//!     lock A                        lock A
//!     unlock B                      stamp acquire (if a release is pending)
//!     stamp release / measure       unlock A
//!     unlock A                      unlock B
//!     lock B
//! ```
//!
//! Both sides take B before A, and nobody waits for B while holding only A.

use crate::mutex::ProcessMutex;
use crate::shm::Shared;
use crate::stats::Stats;
use crate::timer::{Clock, Jitter, Tick};
use crate::{Config, Error, Result};
use log::{debug, info};
use std::ptr;

/// Timestamps guarded by mutex A. The parent alone writes `parent_release`
/// and `child_should_exit`; the child alone sets `child_acquire`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HandoffState {
    pub parent_release: Option<Tick>,
    pub child_acquire: Option<Tick>,
    pub child_should_exit: bool,
}

/// What the parent found when it looked at the shared state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// No cycle in progress; a release time was just recorded.
    Started,
    /// The child acquired since the last release. Carries the latency; a new
    /// release time was recorded straight away.
    Measured(u64),
    /// Release recorded but the child has not run yet.
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildStep {
    Stamped,
    Idle,
    Exit,
}

impl HandoffState {
    /// Parent's step, taken with A held.
    pub fn parent_observe<C: Clock>(&mut self, clock: &C) -> Result<Observation> {
        match (self.parent_release, self.child_acquire) {
            (None, None) => {
                self.parent_release = Some(clock.now());
                Ok(Observation::Started)
            }
            (None, Some(_)) => Err(Error::HandoffOrder),
            (Some(release), Some(acquire)) => {
                let nanos = clock.nanos_between(release, acquire);
                self.child_acquire = None;
                self.parent_release = Some(clock.now());
                Ok(Observation::Measured(nanos))
            }
            (Some(_), None) => Ok(Observation::Pending),
        }
    }

    /// Child's step, taken with B and A held.
    pub fn child_observe<C: Clock>(&mut self, clock: &C) -> ChildStep {
        if self.child_should_exit {
            return ChildStep::Exit;
        }
        if self.child_acquire.is_none() && self.parent_release.is_some() {
            self.child_acquire = Some(clock.now());
            return ChildStep::Stamped;
        }
        ChildStep::Idle
    }
}

/// Layout of the shared mapping.
#[repr(C)]
#[derive(Debug)]
pub struct HandoffRegion {
    a: ProcessMutex<HandoffState>,
    b: ProcessMutex<()>,
}

impl HandoffRegion {
    /// Maps a fresh region with both mutexes process-shared. Must happen
    /// before the fork so both processes see the same mutexes.
    pub fn create() -> Result<Shared<HandoffRegion>> {
        Shared::new(|slot: *mut HandoffRegion| unsafe {
            ProcessMutex::init(ptr::addr_of_mut!((*slot).a), HandoffState::default())?;
            ProcessMutex::init(ptr::addr_of_mut!((*slot).b), ())
        })
    }

    /// Snapshot of the timestamps, taken under A.
    pub fn state(&self) -> Result<HandoffState> {
        Ok(*self.a.lock()?)
    }
}

/// Measures `config.trials` handoffs, then tells the child to exit.
///
/// The exit flag is raised even when measuring fails, so the child never
/// spins forever on a parent that gave up.
pub fn parent<C: Clock>(
    region: &HandoffRegion,
    config: &Config,
    clock: &C,
    stats: &mut Stats,
) -> Result<()> {
    let measured = measure(region, config, clock, stats);

    region.a.lock()?.child_should_exit = true;
    debug!("child told to exit after {} handoffs", stats.count());
    measured
}

fn measure<C: Clock>(
    region: &HandoffRegion,
    config: &Config,
    clock: &C,
    stats: &mut Stats,
) -> Result<()> {
    let mut jitter = Jitter::new(config.random_sleep);
    let mut completed = 0;

    let mut b = region.b.lock()?;
    while completed < config.trials {
        let mut a = region.a.lock()?;
        drop(b);

        jitter.pause();

        if let Observation::Measured(nanos) = a.parent_observe(clock)? {
            info!("{} nanoseconds", nanos);
            stats.record(nanos);
            completed += 1;
        }

        drop(a);
        b = region.b.lock()?;
    }
    Ok(())
}

/// Keeps taking B then A until the parent raises the exit flag. Returns the
/// number of acquire times stamped.
pub fn child<C: Clock>(region: &HandoffRegion, clock: &C) -> Result<u64> {
    let mut stamped = 0;
    loop {
        let _b = region.b.lock()?;
        let mut a = region.a.lock()?;

        match a.child_observe(clock) {
            ChildStep::Exit => break,
            ChildStep::Stamped => stamped += 1,
            ChildStep::Idle => {}
        }
        // A is released before B as the guards go out of scope.
    }
    debug!("child stamped {} acquisitions", stamped);
    Ok(stamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::testing::SequenceClock;
    use crate::timer::MonotonicClock;
    use std::thread;
    use std::time::Duration;

    fn tick(raw: u64) -> Option<Tick> {
        Some(Tick::from_raw(raw))
    }

    #[test]
    fn parent_starts_a_cycle_on_empty_state() {
        let clock = SequenceClock::default();
        let mut state = HandoffState::default();
        assert_eq!(state.parent_observe(&clock).unwrap(), Observation::Started);
        assert_eq!(state.parent_release, tick(1));
        assert_eq!(state.child_acquire, None);
    }

    #[test]
    fn parent_waits_while_child_has_not_run() {
        let clock = SequenceClock::default();
        let mut state = HandoffState {
            parent_release: tick(40),
            ..Default::default()
        };
        assert_eq!(state.parent_observe(&clock).unwrap(), Observation::Pending);
        assert_eq!(state.parent_release, tick(40));
    }

    #[test]
    fn parent_measures_and_restarts_immediately() {
        let clock = SequenceClock::default();
        let mut state = HandoffState::default();
        state.parent_release = Some(clock.now());
        state.child_acquire = Some(clock.now());

        assert_eq!(state.parent_observe(&clock).unwrap(), Observation::Measured(1));
        assert_eq!(state.child_acquire, None);
        assert_eq!(state.parent_release, tick(3));
    }

    #[test]
    fn acquire_without_release_is_fatal() {
        let clock = SequenceClock::default();
        let mut state = HandoffState {
            child_acquire: tick(7),
            ..Default::default()
        };
        assert!(matches!(state.parent_observe(&clock), Err(Error::HandoffOrder)));
    }

    #[test]
    fn child_stamps_once_per_release() {
        let clock = SequenceClock::default();
        let mut state = HandoffState::default();
        assert_eq!(state.child_observe(&clock), ChildStep::Idle);

        state.parent_release = tick(5);
        assert_eq!(state.child_observe(&clock), ChildStep::Stamped);
        let stamped = state.child_acquire;
        assert_eq!(state.child_observe(&clock), ChildStep::Idle);
        assert_eq!(state.child_acquire, stamped);

        state.child_should_exit = true;
        assert_eq!(state.child_observe(&clock), ChildStep::Exit);
    }

    fn run_pair<C: Clock>(config: &Config, clock: &C) -> (Stats, u64) {
        let region = HandoffRegion::create().unwrap();
        let mut stats = Stats::new();
        let stamped = thread::scope(|s| {
            let handle = s.spawn(|| child(&region, clock));
            parent(&region, config, clock, &mut stats).unwrap();
            handle.join().unwrap().unwrap()
        });
        assert!(region.state().unwrap().child_should_exit);
        (stats, stamped)
    }

    #[test]
    fn every_sample_follows_its_own_release() {
        // Ticks are a global sequence: a stale acquire stamped before the
        // current release would give a zero delta.
        let clock = SequenceClock::default();
        let (stats, stamped) = run_pair(&Config::new(200), &clock);

        assert_eq!(stats.count(), 200);
        assert!(stats.summary().min >= 1);
        // The child may catch the release that follows the last sample.
        assert!(stamped == 200 || stamped == 201, "stamped {}", stamped);
    }

    #[test]
    fn completes_with_jitter() {
        let config = Config::new(50).with_random_sleep(Duration::from_micros(200));
        let (stats, _) = run_pair(&config, &MonotonicClock);
        assert_eq!(stats.count(), 50);
    }
}
