use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};

/// Local wall-clock time. The only clock shared by the detectors.
pub type Timestamp = NaiveDateTime;

pub fn now() -> Timestamp {
    Local::now().naive_local()
}

/// Signed seconds from `from` to `to`, microsecond resolution.
pub fn seconds_between(from: Timestamp, to: Timestamp) -> f64 {
    let delta = to.signed_duration_since(from);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// `base + secs`, or `None` when the result leaves chrono's range.
pub fn offset(base: Timestamp, secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    let micros = secs * 1_000_000.0;
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    base.checked_add_signed(ChronoDuration::microseconds(micros.round() as i64))
}

/// Second-resolution rendering used in transcripts.
pub fn format_clock(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
