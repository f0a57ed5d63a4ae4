//! Console logging for the server.
//!
//! Events from this binary and from `rangeid` (built with its `tracing`
//! feature) go through a single `tracing-subscriber` registry:
//!
//! - an [`EnvFilter`] read from `RUST_LOG`, defaulting to `info`,
//! - a pretty `fmt` layer with thread ids, source locations and local RFC 3339
//!   timestamps.
//!
//! HTTP requests are traced separately by the `TraceLayer` on the router.
//!
//! ```bash
//! RUST_LOG=rangeid=debug,tower_http=debug cargo run -p rangeid-server
//! ```

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()?;
    Ok(())
}
