//! Schedule string encoding round trips

use crawlfeed::config::{DEFAULT_RETRY_DELAY_MILLIS, RETRY_DELAY_POLLING_DISABLED};
use crawlfeed::schedule::TimeInterval;
use crawlfeed::store::{FileStore, ScheduleStore};
use crawlfeed::Schedule;

fn interval(start: u8, end: u8) -> TimeInterval {
    TimeInterval::new(start, end).unwrap()
}

#[test]
fn test_round_trip_preserves_every_field() {
    let cases = vec![
        Schedule::new("wiki", 200, vec![interval(0, 24)]).unwrap(),
        Schedule::new("sharepoint-docs", 60, vec![interval(0, 6), interval(22, 24)]).unwrap(),
        Schedule::with_retry_delay("wiki", 500, 120_000, vec![interval(9, 17)]).unwrap(),
        Schedule::with_retry_delay("drain-once", 1000, RETRY_DELAY_POLLING_DISABLED, vec![
            interval(0, 24),
        ])
        .unwrap(),
    ];

    for original in cases {
        let encoded = original.to_string();
        let parsed: Schedule = encoded.parse().unwrap();
        assert_eq!(parsed, original, "round trip changed {encoded}");
    }
}

#[test]
fn test_round_trip_preserves_disabled_marker() {
    let mut schedule = Schedule::new("wiki", 60, vec![interval(0, 24)]).unwrap();
    schedule.disabled = true;

    let encoded = schedule.to_string();
    assert!(encoded.starts_with('#'));
    let parsed: Schedule = encoded.parse().unwrap();
    assert!(parsed.disabled);
    assert_eq!(parsed, schedule);
}

#[test]
fn test_omitted_retry_delay_gets_the_default() {
    let parsed: Schedule = "wiki:60:0-24".parse().unwrap();
    assert_eq!(parsed.retry_delay_millis, DEFAULT_RETRY_DELAY_MILLIS);

    // Encoding always writes the retry delay explicitly, so a re-parse
    // agrees with the first
    let again: Schedule = parsed.to_string().parse().unwrap();
    assert_eq!(again, parsed);
}

#[test]
fn test_intervals_come_back_sorted() {
    let schedule = Schedule::new("wiki", 60, vec![interval(20, 23), interval(3, 6)]).unwrap();
    let parsed: Schedule = schedule.to_string().parse().unwrap();
    assert_eq!(parsed.time_intervals, vec![interval(3, 6), interval(20, 23)]);
}

#[test]
fn test_store_round_trip_through_durable_state() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileStore::new(dir.path()).unwrap();

    let schedule =
        Schedule::with_retry_delay("wiki", 60, 120_000, vec![interval(1, 5), interval(22, 24)])
            .unwrap();
    store.store_schedule(&schedule).unwrap();

    // Reopen the store, as a restarted process would
    let store = FileStore::new(dir.path()).unwrap();
    let loaded = store.get_schedule("wiki").unwrap().unwrap();
    assert_eq!(loaded, schedule);
}
