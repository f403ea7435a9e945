use chrono::{Days, NaiveDate, TimeZone};
use chrono_tz::{Tz, UTC};

use crate::{ClickhouseError, Result};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Wrapper type for the Clickhouse `Date` type: days since the Unix epoch.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug, Default)]
pub struct Date(pub u16);

impl From<Date> for NaiveDate {
    fn from(date: Date) -> Self {
        epoch() + Days::new(date.0 as u64)
    }
}

impl TryFrom<NaiveDate> for Date {
    type Error = ClickhouseError;

    fn try_from(other: NaiveDate) -> Result<Self> {
        let days = other.signed_duration_since(epoch()).num_days();
        u16::try_from(days)
            .map(Date)
            .map_err(|_| ClickhouseError::OutOfBounds(format!("date out of Date range: {other}")))
    }
}

/// Wrapper type for the Clickhouse `Date32` type: signed days since the Unix
/// epoch.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, Debug, Default)]
pub struct Date32(pub i32);

impl From<Date32> for NaiveDate {
    fn from(date: Date32) -> Self {
        if date.0 >= 0 {
            epoch() + Days::new(date.0 as u64)
        } else {
            epoch() - Days::new(-(date.0 as i64) as u64)
        }
    }
}

impl TryFrom<NaiveDate> for Date32 {
    type Error = ClickhouseError;

    fn try_from(other: NaiveDate) -> Result<Self> {
        let days = other.signed_duration_since(epoch()).num_days();
        i32::try_from(days)
            .map(Date32)
            .map_err(|_| ClickhouseError::OutOfBounds(format!("date out of Date32 range: {other}")))
    }
}

/// Wrapper type for the Clickhouse `DateTime` type: zone plus seconds since
/// the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DateTime(pub Tz, pub u32);

impl Default for DateTime {
    fn default() -> Self {
        Self(UTC, 0)
    }
}

impl TryFrom<DateTime> for chrono::DateTime<Tz> {
    type Error = ClickhouseError;

    fn try_from(date: DateTime) -> Result<Self> {
        date.0
            .timestamp_opt(date.1 as i64, 0)
            .single()
            .ok_or_else(|| {
                ClickhouseError::OutOfBounds(format!("invalid DateTime value: {}", date.1))
            })
    }
}

impl From<chrono::DateTime<Tz>> for DateTime {
    fn from(other: chrono::DateTime<Tz>) -> Self {
        Self(other.timezone(), other.timestamp() as u32)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DateTime {
    fn from(other: chrono::DateTime<chrono::Utc>) -> Self {
        Self(UTC, other.timestamp() as u32)
    }
}

/// Wrapper type for the Clickhouse `DateTime64` type: zone, raw tick value,
/// and precision (digits of sub-second resolution).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DynDateTime64(pub Tz, pub u64, pub usize);

impl Default for DynDateTime64 {
    fn default() -> Self {
        Self(UTC, 0, 3)
    }
}

impl TryFrom<DynDateTime64> for chrono::DateTime<Tz> {
    type Error = ClickhouseError;

    fn try_from(date: DynDateTime64) -> Result<Self> {
        let divisor = 10u64.pow(date.2 as u32);
        let seconds = date.1 / divisor;
        let fraction = date.1 % divisor;
        let nanos = if date.2 <= 9 {
            fraction * 10u64.pow(9 - date.2 as u32)
        } else {
            fraction / 10u64.pow(date.2 as u32 - 9)
        };
        date.0
            .timestamp_opt(seconds as i64, nanos as u32)
            .single()
            .ok_or_else(|| {
                ClickhouseError::OutOfBounds(format!("invalid DateTime64 value: {}", date.1))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_roundtrip() {
        let date = Date(19000);
        let naive: NaiveDate = date.into();
        assert_eq!(Date::try_from(naive).unwrap(), date);
    }

    #[test]
    fn date32_negative_days() {
        let date = Date32(-3653);
        let naive: NaiveDate = date.into();
        assert_eq!(naive, NaiveDate::from_ymd_opt(1960, 1, 1).unwrap());
        assert_eq!(Date32::try_from(naive).unwrap(), date);
    }

    #[test]
    fn datetime64_subsecond() {
        let dt = DynDateTime64(UTC, 1_600_000_000_123, 3);
        let chrono: chrono::DateTime<Tz> = dt.try_into().unwrap();
        assert_eq!(chrono.timestamp(), 1_600_000_000);
        assert_eq!(chrono.timestamp_subsec_millis(), 123);
    }
}
