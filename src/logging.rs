//! Purpose: Opt-in diagnostics output for embedders.
//! Exports: `init_tracing`.
//! Role: Installs a stderr fmt subscriber; the library itself only emits `tracing` events.
//! Invariants: Installing twice is harmless; the first subscriber stays.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber, filtered by `RUST_LOG` or `warn` by default.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
