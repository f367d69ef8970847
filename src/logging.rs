//! Logging setup
//!
//! Library code logs through the `log` macros; the binary installs a
//! `tracing-subscriber` fmt subscriber, which also picks up `log` records.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise dualcast logs at info, or debug when
/// `verbose`.
pub fn init(verbose: bool) {
    let default = if verbose { "dualcast=debug" } else { "dualcast=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
    {
        eprintln!("Logging already initialized: {}", e);
    }
}
