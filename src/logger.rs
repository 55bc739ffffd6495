//! Logger set-up.
//!
//! The console backend runs a writer thread, and threads do not survive a
//! fork, so each process calls [`init`] on its own side of the fork.

use crate::{Error, Result};
use log::LevelFilter;

/// `verbose` enables per-iteration lines; otherwise only warnings and errors.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    fast_log::init(fast_log::Config::new().console().level(level))
        .map_err(|err| Error::Logger(err.to_string()))?;
    Ok(())
}

/// Blocks until queued records have been written.
pub fn flush() {
    log::logger().flush();
}
