//! Time for a child blocked on a process-shared mutex to run again after the
//! parent unlocks it.

use ipc_latency::{harness, Protocol};
use std::process::ExitCode;

fn main() -> ExitCode {
    harness::main(Protocol::ShmUnblock)
}
