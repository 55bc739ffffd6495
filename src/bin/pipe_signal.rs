//! Like `pipe`, but the child answers from a second thread woken through a
//! condition variable, adding the wakeup hop an asynchronous signal handler
//! would pay.

use ipc_latency::{harness, Protocol};
use std::process::ExitCode;

fn main() -> ExitCode {
    harness::main(Protocol::PipeSignal)
}
