//! Tracing subscriber setup for binaries and tests
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the application. [`init`] is a convenience for programs that want the usual
//! verbosity-flag behaviour.
//!
//! ```rust,no_run
//! // -v on the command line
//! rangecast::logging::init(1);
//! ```

use tracing_subscriber::EnvFilter;

/// Filter for a verbosity count: 0 `warn`, 1 `info`, 2 `debug`, 3+ `trace`.
///
/// `RUST_LOG` takes precedence when set and valid.
pub fn filter_for(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive_for(verbosity)))
}

fn directive_for(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,{}={level}", env!("CARGO_CRATE_NAME"))
}

/// Install a formatting subscriber on stderr.
///
/// Returns false if a global subscriber was already installed; calling this
/// more than once is harmless.
pub fn init(verbosity: u8) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(verbosity))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Subscriber for tests: captured by the test harness, `RUST_LOG` aware.
#[cfg(any(test, feature = "benchmark"))]
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(0))
        .with_test_writer()
        .try_init();
}
