//! ParaVM bytecode toolchain: assembly lexer and assembler, the in-memory
//! module IR, the `.pvc` binary codec, a structural verifier, a disassembler,
//! and the atom table used by execution contexts.

pub mod bytecode;
pub mod frontend;
pub mod runtime;
pub mod tool;

use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "PARAVM_LOG";

/// Installs the global `tracing` subscriber, writing to stderr.
///
/// `PARAVM_LOG` overrides everything. Otherwise `verbosity` picks the level
/// for this crate: 0 is `warn`, 1 `info`, 2 `debug`, anything higher `trace`.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("paravm={}", level)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
