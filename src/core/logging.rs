//! Tracing subscriber setup for binaries and examples

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global subscriber; `RUST_LOG` wins over the default level.
///
/// Calling it twice is harmless, the second install is ignored.
pub fn init(debug: bool) {
    let default_level = if debug { "conclave=debug" } else { "conclave=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
