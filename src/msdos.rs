//! Conversions between epoch milliseconds and the packed 16-bit MS-DOS
//! date and time fields that ZIP local/central headers carry.
//!
//! Grounded on the bit layout the ZIP spec has used unchanged since the
//! format's MS-DOS origins: 2-second time precision, a year offset from
//! 1980. See `parse_msdos` in the teacher crate for the read half; this
//! module adds the write half the teacher never needed.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

/// Decodes a packed MS-DOS (time, date) pair into a `NaiveDateTime`.
pub fn decode(time: u16, date: u16) -> NaiveDateTime {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; always interpreted as a positive value.
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    // Some ancient archives carry a zero date/time; clamp to the MS-DOS
    // epoch rather than panicking on an invalid day-of-month of 0.
    let days = days.max(1);
    let months = months.max(1);

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours.min(23), minutes.min(59), seconds.min(59)))
        .unwrap_or_else(|| {
            NaiveDate::from_ymd_opt(1980, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        })
}

/// Encodes a `NaiveDateTime` into a packed MS-DOS (time, date) pair.
///
/// Dates before 1980-01-01 (MS-DOS's epoch) clamp to that date, since the
/// format has no way to represent them.
pub fn encode(dt: NaiveDateTime) -> (u16, u16) {
    let seconds = (dt.second() / 2) & 0b0001_1111;
    let minutes = dt.minute() & 0b0011_1111;
    let hours = dt.hour() & 0b0001_1111;
    let time = (hours << 11 | minutes << 5 | seconds) as u16;

    let year = (dt.year() - 1980).max(0) as u32 & 0b0111_1111;
    let month = dt.month() & 0b0000_1111;
    let day = dt.day() & 0b0001_1111;
    let date = (year << 9 | month << 5 | day) as u16;

    (time, date)
}

/// Converts epoch milliseconds (as produced by `DateTime::timestamp_millis`)
/// into a packed MS-DOS (time, date) pair.
pub fn from_epoch_millis(millis: i64) -> (u16, u16) {
    let dt = chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1980, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());
    encode(dt)
}

/// Converts a packed MS-DOS (time, date) pair back into epoch milliseconds.
pub fn to_epoch_millis(time: u16, date: u16) -> i64 {
    decode(time, date).and_utc().timestamp_millis()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_a_typical_timestamp() {
        let dt = NaiveDate::from_ymd_opt(2021, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 54)
            .unwrap();
        let (time, date) = encode(dt);
        let back = decode(time, date);
        // MS-DOS has 2-second precision; the odd second rounds down.
        assert_eq!(back.year(), 2021);
        assert_eq!(back.month(), 3);
        assert_eq!(back.day(), 14);
        assert_eq!(back.hour(), 9);
        assert_eq!(back.minute(), 26);
        assert_eq!(back.second(), 54);
    }

    #[test]
    fn clamps_dates_before_the_msdos_epoch() {
        let dt = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let (time, date) = encode(dt);
        let back = decode(time, date);
        assert_eq!(back.year(), 1980);
    }

    #[test]
    fn epoch_millis_round_trip() {
        let millis = 1_700_000_000_000i64;
        let (time, date) = from_epoch_millis(millis);
        let back = to_epoch_millis(time, date);
        // 2-second precision means we can be off by at most ~2000ms.
        assert!((back - millis).abs() <= 2000);
    }
}
