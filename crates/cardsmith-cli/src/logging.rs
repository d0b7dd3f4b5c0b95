//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// `verbose` raises the cardsmith crates to `debug` unless `RUST_LOG` is set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,cardsmith_application=debug,cardsmith_interaction=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    // a second init (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
