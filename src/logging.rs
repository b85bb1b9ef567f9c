//! Tracing setup for applications embedding the engine
//!
//! Libraries only emit spans and events; installing a subscriber is the
//! application's job. This helper wires up the conventional setup: an
//! `EnvFilter` honoring `RUST_LOG`, and JSON output when `CRAWLFEED_LOG_JSON`
//! is set.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Call once at application startup. Returns an error if a subscriber is
/// already installed, which callers embedding the engine next to their own
/// tracing setup may safely ignore.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json_format = std::env::var("CRAWLFEED_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("crawlfeed=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()?;
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()?;
    }
    Ok(())
}
