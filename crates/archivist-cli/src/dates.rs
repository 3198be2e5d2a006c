use anyhow::{anyhow, Context};
use chrono::{NaiveDate, TimeZone, Utc};

/// UTC midnight at the start of a `YYYYMMDD` day, as unix seconds.
pub fn day_start(day: &str) -> anyhow::Result<i64> {
    let date = NaiveDate::parse_from_str(day, "%Y%m%d")
        .with_context(|| format!("'{}' is not a YYYYMMDD date", day))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("no midnight on {}", day))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp())
}

/// Inclusive window for `[begin, end)` days: `end` names the first day outside the window.
pub fn day_window(begin: &str, end: &str) -> anyhow::Result<(i64, i64)> {
    Ok((day_start(begin)?, day_start(end)? - 1))
}
