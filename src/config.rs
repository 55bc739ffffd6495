//! Command-line options and the configuration handed to each role.

use clap::Parser;
use std::time::Duration;

pub const DEFAULT_ITERATIONS: u32 = 1000;

/// Measure inter-process wakeup latency between a parent and a forked child
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Enable logging of per-iteration latencies and PIDs
    #[arg(short = 'l')]
    pub logging: bool,

    /// Number of test iterations
    #[arg(
        short = 'i',
        value_name = "ITERATIONS",
        default_value_t = DEFAULT_ITERATIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub iterations: u32,

    /// Enable random sleeps of up to MICROSECONDS before each iteration
    #[arg(
        short = 's',
        value_name = "MICROSECONDS",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub sleep: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Latency samples to collect, at least one.
    pub trials: u32,
    pub logging: bool,
    /// Upper bound of the random pause before each trial, if any.
    pub random_sleep: Option<Duration>,
}

impl Config {
    pub fn new(trials: u32) -> Config {
        Config {
            trials: trials.max(1),
            logging: false,
            random_sleep: None,
        }
    }

    pub fn with_random_sleep(mut self, max: Duration) -> Config {
        self.random_sleep = Some(max).filter(|d| !d.is_zero());
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(DEFAULT_ITERATIONS)
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            trials: args.iterations,
            logging: args.logging,
            random_sleep: args.sleep.map(|us| Duration::from_micros(us as u64)),
        }
    }
}
