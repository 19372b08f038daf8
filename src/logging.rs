//! Log output for the command-line tool.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "relsign=info";
pub const VERBOSE_FILTER: &str = "relsign=debug";

/// Build the log filter. `RUST_LOG` wins over `verbose`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber, writing to stderr. Safe to call more
/// than once; later calls are ignored.
pub fn init(verbose: bool) {
    fmt()
        .with_env_filter(env_filter(verbose))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}
