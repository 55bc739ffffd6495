//! Round-trip latency of a poke/reply exchange over two pipes.

use ipc_latency::{harness, Protocol};
use std::process::ExitCode;

fn main() -> ExitCode {
    harness::main(Protocol::Pipe)
}
