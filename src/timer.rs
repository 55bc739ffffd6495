//! Monotonic tick source shared by both processes.
//!
//! Ticks come from a system-wide clock, so a tick stamped in the child can be
//! subtracted from one stamped in the parent.

use cfg_if::cfg_if;
use rand::rngs::ThreadRng;
use rand::Rng;
use std::thread;
use std::time::Duration;

/// Opaque reading of the platform clock. Only differences are meaningful.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Tick(u64);

impl Tick {
    pub const fn from_raw(raw: u64) -> Tick {
        Tick(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, zero if `earlier` is actually later.
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

cfg_if! {
    if #[cfg(any(target_os = "macos", target_os = "ios"))] {
        use std::sync::OnceLock;

        static TIMEBASE: OnceLock<(u64, u64)> = OnceLock::new();

        #[allow(deprecated)]
        fn timebase() -> (u64, u64) {
            *TIMEBASE.get_or_init(|| unsafe {
                let mut info: libc::mach_timebase_info = std::mem::zeroed();
                if libc::mach_timebase_info(&mut info) != 0 || info.denom == 0 {
                    return (1, 1);
                }
                (info.numer as u64, info.denom as u64)
            })
        }

        /// Captures the tick-to-nanosecond scale. Call once at start-up.
        pub fn init() {
            timebase();
        }

        #[allow(deprecated)]
        pub fn now() -> Tick {
            Tick(unsafe { libc::mach_absolute_time() })
        }

        pub fn ticks_to_nanoseconds(delta: u64) -> u64 {
            let (numer, denom) = timebase();
            (delta as u128 * numer as u128 / denom as u128) as u64
        }
    } else {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC_RAW;
        #[cfg(not(any(target_os = "linux", target_os = "android")))]
        const CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;

        /// Nothing to calibrate: ticks are already nanoseconds.
        pub fn init() {}

        pub fn now() -> Tick {
            unsafe {
                let mut tp: libc::timespec = std::mem::zeroed();
                if libc::clock_gettime(CLOCK, &mut tp) == -1 {
                    return Tick(0);
                }
                Tick(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
            }
        }

        pub fn ticks_to_nanoseconds(delta: u64) -> u64 {
            delta
        }
    }
}

/// Where the protocols get their timestamps from.
pub trait Clock: Sync {
    fn now(&self) -> Tick;

    fn nanos_between(&self, start: Tick, end: Tick) -> u64 {
        ticks_to_nanoseconds(end.since(start))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        now()
    }
}

/// Random pause of up to a configured bound before each trial.
pub struct Jitter {
    max_micros: u64,
    rng: ThreadRng,
}

impl Jitter {
    pub fn new(max: Option<Duration>) -> Jitter {
        Jitter {
            max_micros: max.map_or(0, |d| d.as_micros() as u64),
            rng: rand::thread_rng(),
        }
    }

    pub fn pause(&mut self) {
        if self.max_micros == 0 {
            return;
        }
        let micros = self.rng.gen_range(0..self.max_micros);
        thread::sleep(Duration::from_micros(micros));
    }
}
