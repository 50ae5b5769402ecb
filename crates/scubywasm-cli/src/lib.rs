//! Shared plumbing for the Scubywasm binaries.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install the tracing subscriber on **stderr**; stdout belongs to the JSON
/// log in `scubywasm-run`. `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Install the INT/TERM handler for a coordinator: the first signal flips
/// the returned flag and nothing else. Worker children live in their own
/// process group, so in-flight matches drain.
pub fn install_stop_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        tracing::info!("shutdown requested; draining in-flight matches");
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(stop)
}
