//! Logging setup shared by the binaries.
//!
//! Modules pull the macros in through [`prelude`] so the crate has a single
//! place to swap the logging backend.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Logs go to the systemd journal when the process was started by systemd
/// (`JOURNAL_STREAM` is set and the journal socket is reachable), and to
/// stdout otherwise. `RUST_LOG` overrides the default `info` filter.
pub fn init_journald_or_stdout() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let journald = if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_journald::layer().ok()
    } else {
        None
    };

    let stdout = journald
        .is_none()
        .then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(journald)
        .with(stdout)
        .init();
}
