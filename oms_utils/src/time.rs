use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::infrastructure::WithExpect;
use crate::DateTime;

pub fn millis_to_date_time(src: i64) -> DateTime {
    (UNIX_EPOCH + Duration::from_millis(src.max(0) as u64)).into()
}

/// Current wall-clock time in whole milliseconds since the Unix epoch, used
/// throughout the reconciler as the monotonic cursor unit (spec §4.6).
pub fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
        .as_millis() as i64
}

pub trait ToStdExpected {
    fn to_std_expected(&self) -> Duration;
}

impl ToStdExpected for chrono::Duration {
    /// # Panics
    /// Panics only on a negative delay.
    fn to_std_expected(&self) -> Duration {
        self.to_std().with_expect(|| {
            format!("Unable to convert {self} from chrono::Duration to std::time::Duration")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_millis_is_monotonic_enough() {
        let a = current_millis();
        let b = current_millis();
        assert!(b >= a);
    }

    #[test]
    fn millis_to_date_time_roundtrips_through_timestamp() {
        let now_ms = current_millis();
        let dt = millis_to_date_time(now_ms);
        assert_eq!(dt.timestamp_millis(), now_ms);
    }
}
