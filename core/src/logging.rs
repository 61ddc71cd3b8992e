//! Diagnostic output for tools built on this crate.
//!
//! `ARVADOS_DEBUG` (by presence) turns on debug-level events; otherwise
//! `RUST_LOG` applies, falling back to `info`.

use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

fn filter_for(settings: &Settings) -> EnvFilter {
    if settings.debug() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install a stderr `fmt` subscriber. Does nothing if one is already set.
pub fn init(settings: &Settings) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter_for(settings))
        .with_writer(std::io::stderr)
        .try_init();
    if installed.is_ok() && settings.debug() {
        tracing::debug!("ARVADOS_DEBUG set, verbose diagnostics enabled");
    }
}
