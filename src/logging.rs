//! Tracing subscriber setup for the `memdex` binary.
//!
//! Logs go to stderr so stdout stays machine-readable. `RUST_LOG` takes
//! precedence; otherwise memdex crates log at `info` (`debug` with `-v`).

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("memdex={level},memdex_core={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
