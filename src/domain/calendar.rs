use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

/// Calendar day of `at` on the office clock `tz`.
pub fn local_day<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
  at.with_timezone(tz).date_naive()
}

/// `[start, end)` in UTC of `day` as seen on the office clock `tz`.
pub fn day_bounds<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
  let start = local_midnight(day, tz);
  let end = day
    .succ_opt()
    .map(|next| local_midnight(next, tz))
    .unwrap_or(start + Duration::days(1));
  (start, end)
}

// A DST jump at midnight skips 00:00; the day then starts at the first
// instant that exists.
fn local_midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> DateTime<Utc> {
  let midnight = day.and_hms_opt(0, 0, 0).unwrap_or_default();
  (0..=2)
    .find_map(|hours| {
      tz.from_local_datetime(&(midnight + Duration::hours(hours)))
        .earliest()
    })
    .map(|at| at.with_timezone(&Utc))
    .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
