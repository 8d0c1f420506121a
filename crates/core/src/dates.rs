//! Pure calendar helpers. No I/O, no side effects.

use chrono::{Local, NaiveDate};

/// Today's date on the user's local calendar, so "today" matches what the
/// player sees on their wall clock.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` key, tolerating unpadded month/day segments
/// (`2025-2-3`). Rejects anything that is not a real calendar date
/// (e.g. `2025-02-30`).
pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    let mut parts = key.trim().splitn(3, '-');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Serde adapter for wire dates that may arrive unpadded.
///
/// Server-stored and locally-stored keys must compare equal regardless of
/// padding, so deserialization goes through [`parse_date_key`].
pub mod lenient_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(date)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date_key(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid calendar date '{raw}'")))
    }
}
