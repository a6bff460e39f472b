use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Weekday};

/// Project a recurring weekly slot onto its nearest occurrence at or
/// after today. When today is the target weekday the occurrence is
/// today even if the time already passed; the one-hour-after threshold
/// covers the "just finished" case.
pub fn next_occurrence(
    weekday: Weekday,
    time: NaiveTime,
    now: DateTime<FixedOffset>,
) -> DateTime<FixedOffset> {
    let days_ahead = (weekday.num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64
        + 7)
        % 7;
    let naive = (now.date_naive() + Duration::days(days_ahead)).and_time(time);

    // A fixed offset has no gaps or folds, so the mapping is total.
    naive.and_local_timezone(*now.offset()).single().unwrap_or(now)
}
