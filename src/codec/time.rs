//! Timestamp conversion between the wire and `chrono`.
//!
//! A missing or out-of-range timestamp decodes to the Unix epoch.

use chrono::{DateTime, Utc};

use crate::wire::Timestamp;

/// Convert a wire timestamp to a UTC date-time.
pub fn to_datetime(ts: Option<Timestamp>) -> DateTime<Utc> {
    ts.and_then(|ts| {
        let nanos = u32::try_from(ts.nanos).ok()?;
        DateTime::from_timestamp(ts.seconds, nanos)
    })
    .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Convert a UTC date-time to a wire timestamp.
pub fn from_datetime(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_timestamp_is_epoch() {
        assert_eq!(to_datetime(None), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_negative_nanos_is_epoch() {
        let ts = Timestamp {
            seconds: 10,
            nanos: -1,
        };
        assert_eq!(to_datetime(Some(ts)), DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_subsecond_precision_kept() {
        let dt = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let ts = from_datetime(dt);

        assert_eq!(ts.seconds, 1_700_000_000);
        assert_eq!(ts.nanos, 123_456_789);
        assert_eq!(to_datetime(Some(ts)), dt);
    }
}
