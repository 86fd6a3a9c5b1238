use super::*;

#[test]
fn fixed_clock_advances_monotonically() {
    let clock = FixedClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    clock.advance(Duration::from_secs(5));
    assert_eq!(clock.now_ms(), 6_000);
    clock.set(42);
    assert_eq!(clock.now_ms(), 42);
}
