//! Logging initialization behavior

use crawlfeed::logging::init_tracing;
use tracing::{info, warn};

#[test]
fn test_init_tracing_is_safe_to_call() {
    // First call installs the subscriber; a second call reports the conflict
    // instead of panicking
    let first = init_tracing();
    let second = init_tracing();
    assert!(first.is_ok() || second.is_err());

    // Emitting events never panics regardless of subscriber state
    info!(source = "wiki", "logging smoke test");
    warn!(attempt = 1u32, "logging smoke test warning");
}
