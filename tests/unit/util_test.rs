//! Tests for time sources and telemetry helpers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_scheduled_executor::util::{
    init_tracing, SystemTimeSource, TimeSource, VirtualTimeSource,
};

#[test]
fn test_system_time_source_parks_until_deadline() {
    let clock = SystemTimeSource::new();
    let deadline = clock.now() + Duration::from_millis(500);
    let park = clock.park_timeout(deadline).unwrap();
    assert!(park <= Duration::from_millis(500));

    std::thread::sleep(Duration::from_millis(5));
    assert!(clock.now() >= Duration::from_millis(5));
}

#[test]
fn test_virtual_time_source_wakes_every_subscriber() {
    let clock = VirtualTimeSource::new();
    let fired = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let fired = Arc::clone(&fired);
        clock.subscribe(Arc::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            true
        }));
    }

    clock.advance(Duration::from_millis(10));
    assert_eq!(fired.load(Ordering::SeqCst), 3);

    // Setting an earlier instant is ignored and wakes nobody
    clock.set(Duration::from_millis(5));
    assert_eq!(fired.load(Ordering::SeqCst), 3);
    assert_eq!(clock.now(), Duration::from_millis(10));
}

#[test]
fn test_virtual_time_source_debug() {
    let clock = VirtualTimeSource::new();
    clock.advance(Duration::from_secs(2));
    let debug = format!("{clock:?}");
    assert!(debug.contains("VirtualTimeSource"));
    assert!(debug.contains("2s"));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
}
