use windrow::{windows_between, TimeWindow, WindowError};

const FIFTEEN_MINUTES: u64 = 15 * 60 * 1000;

/// Thu, Aug 25 2016 13:27:10 GMT
const AUG2016: u64 = 1_472_131_630_748;

#[test]
fn window_index_is_floor_of_timestamp_over_duration() {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    assert_eq!(window.index(), AUG2016 / FIFTEEN_MINUTES);
    assert_eq!(window.start_millis(), window.index() * FIFTEEN_MINUTES);
    assert_eq!(
        window.end_millis(),
        window.start_millis() + FIFTEEN_MINUTES
    );
    assert!(window.start_millis() <= AUG2016);
    assert!(AUG2016 < window.end_millis());
}

#[test]
fn timestamps_in_same_bucket_share_a_window() {
    let first = TimeWindow::containing(1_000, 500).expect("valid duration");
    let second = TimeWindow::containing(1_499, 500).expect("valid duration");
    assert_eq!(first, second);
}

#[test]
fn next_steps_to_the_adjacent_window() {
    let window = TimeWindow::containing(AUG2016, FIFTEEN_MINUTES).expect("valid duration");
    let next = window.next();
    assert_eq!(next.index(), window.index() + 1);
    assert_eq!(next.start_millis(), window.end_millis());
    assert_eq!(next.duration_millis(), window.duration_millis());
}

#[test]
fn zero_duration_is_rejected_at_construction() {
    assert_eq!(
        TimeWindow::containing(AUG2016, 0),
        Err(WindowError::ZeroDuration)
    );
    assert_eq!(TimeWindow::from_index(7, 0), Err(WindowError::ZeroDuration));
    assert_eq!(
        windows_between(0, 1_000, 0),
        Err(WindowError::ZeroDuration)
    );
}

#[test]
fn one_hour_of_fifteen_minute_windows_yields_five() {
    // Inclusive at both ends: (60 / 15) + 1.
    let windows =
        windows_between(AUG2016, AUG2016 + 60 * 60 * 1000, FIFTEEN_MINUTES).expect("valid range");
    assert_eq!(windows.len(), 5);
    for pair in windows.windows(2) {
        assert_eq!(pair[1].index(), pair[0].index() + 1);
    }
}

#[test]
fn one_duration_span_yields_two_windows() {
    let start = 10 * FIFTEEN_MINUTES;
    let windows =
        windows_between(start, start + FIFTEEN_MINUTES, FIFTEEN_MINUTES).expect("valid range");
    assert_eq!(windows.len(), 2);
    assert_eq!(windows[0].index(), 10);
    assert_eq!(windows[1].index(), 11);
}

#[test]
fn span_inside_a_single_bucket_yields_one_window() {
    let windows = windows_between(100, 200, FIFTEEN_MINUTES).expect("valid range");
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].index(), 0);
}

#[test]
fn inverted_range_yields_no_windows() {
    let windows = windows_between(AUG2016, AUG2016 - 1, FIFTEEN_MINUTES).expect("valid range");
    assert!(windows.is_empty());
}

#[test]
fn has_elapsed_is_exclusive_of_the_end_boundary() {
    let window = TimeWindow::from_index(3, 1_000).expect("valid duration");
    assert!(!window.has_elapsed(window.end_millis() - 1));
    assert!(window.has_elapsed(window.end_millis()));
}
