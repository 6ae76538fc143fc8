use std::cmp::Ordering;

/// Simulated time point usable as an ordered map key.
///
/// Ordering uses `f64::total_cmp`, NaN never reaches a key because the event queue rejects it.
#[derive(Debug, Clone, Copy)]
pub struct TimePoint(pub f64);

impl PartialEq for TimePoint {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TimePoint {}

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for TimePoint {
    fn from(value: f64) -> Self {
        TimePoint(value)
    }
}
