//! Calendar conversion between epoch milliseconds and wire fields.
//!
//! Temporal values cross the wire as calendar fields (year, month, day,
//! hour, minute, second, microseconds) while callers work in epoch
//! milliseconds. The conversion needs a UTC offset; [`TemporalConvention`]
//! picks it. One convention applies to both directions, so a value bound
//! as a parameter and fetched back lands on the same instant regardless
//! of the process timezone.

/// Calendar fields of a temporal wire value.
///
/// DATE and DATETIME leave unused fields at zero. TIME values are
/// durations: the wire day count is folded into `hour` and `negative`
/// carries the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// Hours; may exceed 23 for TIME durations
    pub hour: u16,
    pub minute: u8,
    pub second: u8,
    pub micros: u32,
    /// Sign flag, only meaningful for TIME durations
    pub negative: bool,
}

impl WireDateTime {
    /// Split epoch milliseconds into calendar fields under the given
    /// offset. Returns `None` when the instant falls outside the years
    /// the wire format can carry.
    #[must_use]
    pub fn from_epoch_millis(millis: i64, offset_seconds: i32) -> Option<Self> {
        let secs = millis.div_euclid(1000) + i64::from(offset_seconds);
        let sub_millis = millis.rem_euclid(1000);

        let days = secs.div_euclid(86_400);
        let time_of_day = secs.rem_euclid(86_400);

        let (year, month, day) = civil_from_days(days);
        if !(0..=9999).contains(&year) {
            return None;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (time_of_day / 3600) as u16,
            minute: ((time_of_day % 3600) / 60) as u8,
            second: (time_of_day % 60) as u8,
            micros: (sub_millis * 1000) as u32,
            negative: false,
        })
    }

    /// Collapse calendar fields back to epoch milliseconds under the
    /// given offset. Returns `None` for fields that do not name a civil
    /// date, including the all-zero date.
    #[must_use]
    pub fn to_epoch_millis(&self, offset_seconds: i32) -> Option<i64> {
        if !(1..=12).contains(&self.month) || !(1..=31).contains(&self.day) || self.hour > 23 {
            return None;
        }
        let days = days_from_civil(i32::from(self.year), u32::from(self.month), u32::from(self.day));
        let secs = days
            .checked_mul(86_400)?
            .checked_add(i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second))?
            .checked_sub(i64::from(offset_seconds))?;
        secs.checked_mul(1000)?.checked_add(i64::from(self.micros / 1000))
    }

    /// Duration in milliseconds for TIME values.
    #[must_use]
    pub fn to_duration_millis(&self) -> i64 {
        let magnitude = (i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 + i64::from(self.second))
            * 1000
            + i64::from(self.micros / 1000);
        if self.negative { -magnitude } else { magnitude }
    }
}

/// UTC offset used when converting between epoch milliseconds and
/// calendar fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemporalConvention {
    /// Calendar fields are UTC
    #[default]
    Utc,
    /// Calendar fields follow the process-local offset at call time;
    /// falls back to UTC when the platform cannot report it
    LocalOffset,
    /// Calendar fields follow a fixed offset, in seconds east of UTC
    FixedOffset { seconds: i32 },
}

impl TemporalConvention {
    /// Resolve the offset to apply, in seconds east of UTC.
    #[must_use]
    pub fn offset_seconds(self) -> i32 {
        match self {
            TemporalConvention::Utc => 0,
            TemporalConvention::FixedOffset { seconds } => seconds,
            TemporalConvention::LocalOffset => match time::UtcOffset::current_local_offset() {
                Ok(offset) => offset.whole_seconds(),
                Err(err) => {
                    tracing::warn!(error = %err, "local offset unavailable, using UTC");
                    0
                }
            },
        }
    }
}

/// Days since the Unix epoch for a civil date.
///
/// Howard Hinnant's civil calendar algorithm, using a March-based year
/// so leap days land at the end.
fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    #[allow(clippy::cast_sign_loss)]
    let yoe = (y - era * 400) as u32; // [0, 399]
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    i64::from(era) * 146_097 + i64::from(doe) - 719_468
}

/// Civil date for a day count since the Unix epoch. Inverse of
/// [`days_from_civil`].
#[allow(clippy::cast_possible_truncation)]
fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719_468;
    let era = if z >= 0 { z / 146_097 } else { (z - 146_096) / 146_097 };
    #[allow(clippy::cast_sign_loss)]
    let doe = (z - era * 146_097) as u32; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365; // [0, 399]
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11], March-based
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 }; // [1, 12]
    let year = if m <= 2 { y + 1 } else { y };
    (year as i32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn civil_conversions_are_inverse() {
        for days in [-719_468, -1, 0, 1, 10_957, 19_782, 2_932_896] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days, "day {days}");
        }
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(10_957), (2000, 1, 1));
        assert_eq!(civil_from_days(19_782), (2024, 2, 29));
    }

    #[test]
    fn epoch_zero_is_unix_epoch() {
        let dt = WireDateTime::from_epoch_millis(0, 0).unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (1970, 1, 1));
        assert_eq!((dt.hour, dt.minute, dt.second, dt.micros), (0, 0, 0, 0));
        assert_eq!(dt.to_epoch_millis(0), Some(0));
    }

    #[test]
    fn millis_roundtrip_under_utc() {
        for millis in [0, 1, 999, -1000, 951_782_400_000, 1_709_212_799_123] {
            let dt = WireDateTime::from_epoch_millis(millis, 0).unwrap();
            assert_eq!(dt.to_epoch_millis(0), Some(millis), "millis {millis}");
        }
    }

    #[test]
    fn matches_time_crate() {
        let instant = datetime!(2024-02-29 13:05:59.123 UTC);
        let millis = instant.unix_timestamp() * 1000 + 123;
        let dt = WireDateTime::from_epoch_millis(millis, 0).unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (2024, 2, 29));
        assert_eq!((dt.hour, dt.minute, dt.second), (13, 5, 59));
        assert_eq!(dt.micros, 123_000);
    }

    #[test]
    fn offset_shifts_calendar_fields() {
        // One hour east of UTC: epoch midnight reads as 01:00
        let dt = WireDateTime::from_epoch_millis(0, 3600).unwrap();
        assert_eq!((dt.year, dt.month, dt.day, dt.hour), (1970, 1, 1, 1));
        assert_eq!(dt.to_epoch_millis(3600), Some(0));

        // One hour west crosses the date line backwards
        let dt = WireDateTime::from_epoch_millis(0, -3600).unwrap();
        assert_eq!((dt.year, dt.month, dt.day, dt.hour), (1969, 12, 31, 23));
        assert_eq!(dt.to_epoch_millis(-3600), Some(0));
    }

    #[test]
    fn pre_epoch_millis_floor_correctly() {
        let dt = WireDateTime::from_epoch_millis(-1, 0).unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (1969, 12, 31));
        assert_eq!((dt.hour, dt.minute, dt.second), (23, 59, 59));
        assert_eq!(dt.micros, 999_000);
    }

    #[test]
    fn zero_date_fails_conversion() {
        assert_eq!(WireDateTime::default().to_epoch_millis(0), None);
        let bad_month = WireDateTime {
            year: 2024,
            month: 13,
            day: 1,
            ..WireDateTime::default()
        };
        assert_eq!(bad_month.to_epoch_millis(0), None);
    }

    #[test]
    fn out_of_range_year_rejected_on_split() {
        // Past year 9999
        assert!(WireDateTime::from_epoch_millis(260_000_000_000_000, 0).is_none());
        // Before year 0
        assert!(WireDateTime::from_epoch_millis(-63_000_000_000_000, 0).is_none());
    }

    #[test]
    fn durations_carry_sign() {
        let t = WireDateTime {
            hour: 51,
            minute: 4,
            second: 5,
            micros: 500_000,
            negative: true,
            ..WireDateTime::default()
        };
        assert_eq!(t.to_duration_millis(), -(51 * 3_600_000 + 4 * 60_000 + 5_000 + 500));
    }

    #[test]
    fn convention_offsets() {
        assert_eq!(TemporalConvention::Utc.offset_seconds(), 0);
        assert_eq!(
            TemporalConvention::FixedOffset { seconds: -18_000 }.offset_seconds(),
            -18_000
        );
    }
}
