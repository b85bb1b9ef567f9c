//! BatchResult timing invariants

use crawlfeed::traversal::{BatchResult, DelayPolicy};

#[test]
fn test_elapsed_is_positive_for_instant_batches() {
    let result = BatchResult::new(DelayPolicy::Poll, 0, 5000, 5000);
    assert_eq!(result.elapsed_millis(), 1);
    assert!(result.end_time_millis() > result.start_time_millis());
}

#[test]
fn test_elapsed_survives_clock_skew() {
    // A stepped-back clock must not produce a negative span
    let result = BatchResult::new(DelayPolicy::Error, 3, 10_000, 9_000);
    assert!(result.elapsed_millis() >= 1);
    assert!(result.end_time_millis() > result.start_time_millis());
}

#[test]
fn test_normal_span_is_reported_exactly() {
    let result = BatchResult::new(DelayPolicy::Immediate, 25, 1_000, 3_500);
    assert_eq!(result.elapsed_millis(), 2_500);
    assert_eq!(result.count_processed(), 25);
    assert_eq!(result.delay_policy(), DelayPolicy::Immediate);
}
