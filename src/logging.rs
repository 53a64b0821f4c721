//! Tracing setup for the CLI.

use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr so stdout stays clean for JSON output.
///
/// `PALCTL_LOG` takes an `EnvFilter` directive (e.g. `palctl=debug`). Without
/// it the level is `warn`, or `debug` when `debug` is set.
pub fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("PALCTL_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(debug)
        .try_init();

    if let Err(e) = result {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
}
