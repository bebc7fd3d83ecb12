use chrono::{DateTime, Utc};

/// Milliseconds elapsed since `since`, or zero if `since` lies in the future.
#[must_use]
pub fn elapsed_ms(since: DateTime<Utc>) -> u64 {
    u64::try_from((Utc::now() - since).num_milliseconds()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_timestamps_clamp_to_zero() {
        let later = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(elapsed_ms(later), 0);
    }

    #[test]
    fn past_timestamps_count_up() {
        let earlier = Utc::now() - chrono::Duration::seconds(2);
        assert!(elapsed_ms(earlier) >= 2_000);
    }
}
