use crate::error::{BotResult, Error};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// How far to search forward for the first valid local instant of a day
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Parse time string in strict HH:MM format (24h, two digits each)
pub fn parse_time(time_str: &str) -> Option<(u32, u32)> {
    let (hour, minute) = time_str.split_once(':')?;
    if hour.len() != 2 || minute.len() != 2 {
        return None;
    }
    if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Parse a trigger time, reporting the raw string on failure
pub fn parse_trigger_time(raw: &str) -> BotResult<(u32, u32)> {
    parse_time(raw).ok_or_else(|| Error::InvalidTriggerTime {
        raw: raw.to_string(),
    })
}

/// Parse an IANA timezone name
pub fn parse_timezone(name: &str) -> BotResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| Error::InvalidTimezone(name.to_string()))
}

/// First instant of a civil day in `tz`.
///
/// Midnight may not exist on a DST transition day; the first valid local
/// minute after it is used instead.
pub fn start_of_day(date: NaiveDate, tz: Tz) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..MAX_GAP_MINUTES)
        .find_map(|minutes| match tz.from_local_datetime(&(midnight + Duration::minutes(minutes))) {
            LocalResult::Single(dt) => Some(dt),
            LocalResult::Ambiguous(earliest, _) => Some(earliest),
            LocalResult::None => None,
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// Inclusive instant range `[00:00:00.000, 23:59:59.999]` of a civil day in `tz`.
///
/// The window ends one millisecond before the next day starts, so its
/// absolute length follows the zone's DST transitions.
pub fn day_window(date: NaiveDate, tz: Tz) -> (DateTime<Tz>, DateTime<Tz>) {
    let start = start_of_day(date, tz);
    let next = date.succ_opt().unwrap_or(date);
    let end = start_of_day(next, tz) - Duration::milliseconds(1);
    (start, end)
}

/// Day window for a timezone given by name
pub fn resolve_day_window(
    date: NaiveDate,
    timezone: &str,
) -> BotResult<(DateTime<Tz>, DateTime<Tz>)> {
    let tz = parse_timezone(timezone)?;
    Ok(day_window(date, tz))
}

/// Civil date of an instant in `tz`
pub fn local_date(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// Civil date `days` after the local date of `now`
pub fn local_date_offset(now: DateTime<Utc>, tz: Tz, days: i64) -> NaiveDate {
    local_date(now, tz) + Duration::days(days)
}

/// Instant at which local wall-clock `hour:minute` occurs on `date` in `tz`.
///
/// An ambiguous time (clocks going back) resolves to the earlier instant.
/// A skipped time (clocks going forward) resolves to one hour later.
pub fn fire_instant_on(date: NaiveDate, hour: u32, minute: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let naive: NaiveDateTime = date.and_hms_opt(hour, minute, 0)?;
    let resolve = |naive: &NaiveDateTime| match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    };

    resolve(&naive)
        .or_else(|| resolve(&(naive + Duration::hours(1))))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Next instant strictly after `after` at local `hour:minute` in `tz`
pub fn next_fire_after(
    hour: u32,
    minute: u32,
    tz: Tz,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let today = local_date(after, tz);
    (0..=7)
        .filter_map(|offset| fire_instant_on(today + Duration::days(offset), hour, minute, tz))
        .find(|candidate| *candidate > after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_time() {
        // Valid cases
        assert_eq!(parse_time("00:00"), Some((0, 0)));
        assert_eq!(parse_time("07:30"), Some((7, 30)));
        assert_eq!(parse_time("23:59"), Some((23, 59)));

        // Invalid cases
        assert_eq!(parse_time("24:00"), None); // Hour out of range
        assert_eq!(parse_time("12:60"), None); // Minute out of range
        assert_eq!(parse_time("7:30"), None); // Single digit hour
        assert_eq!(parse_time("12:30:45"), None); // Too many parts
        assert_eq!(parse_time("12"), None); // Too few parts
        assert_eq!(parse_time("12:ab"), None);
        assert_eq!(parse_time("+1:30"), None);
        assert_eq!(parse_time(" 12:30"), None);
        assert_eq!(parse_time(""), None);
    }

    #[test]
    fn test_parse_trigger_time_error() {
        match parse_trigger_time("25:00") {
            Err(Error::InvalidTriggerTime { raw }) => assert_eq!(raw, "25:00"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Europe/London").is_ok());
        assert!(matches!(
            parse_timezone("Mars/Olympus"),
            Err(Error::InvalidTimezone(name)) if name == "Mars/Olympus"
        ));
    }

    #[test]
    fn test_day_window_regular_day() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (start, end) = resolve_day_window(date, "Europe/Helsinki").unwrap();

        assert_eq!(start.to_rfc3339(), "2024-06-01T00:00:00+03:00");
        assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
        assert_eq!(end - start, Duration::days(1) - Duration::milliseconds(1));
    }

    #[test]
    fn test_day_window_spring_forward() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let (start, end) = resolve_day_window(date, "Europe/London").unwrap();

        assert_eq!(start.date_naive(), date);
        assert_eq!(start.format("%H:%M:%S%.3f").to_string(), "00:00:00.000");
        assert_eq!(end.date_naive(), date);
        assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
        assert_eq!(end - start, Duration::hours(23) - Duration::milliseconds(1));
    }

    #[test]
    fn test_day_window_fall_back() {
        let date = NaiveDate::from_ymd_opt(2024, 11, 3).unwrap();
        let (start, end) = resolve_day_window(date, "America/New_York").unwrap();

        assert_eq!(start.format("%H:%M:%S%.3f").to_string(), "00:00:00.000");
        assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
        assert_eq!(end - start, Duration::hours(25) - Duration::milliseconds(1));
    }

    #[test]
    fn test_day_window_missing_midnight() {
        // Brazil moved clocks from 00:00 to 01:00 on this day
        let date = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let (start, _) = resolve_day_window(date, "America/Sao_Paulo").unwrap();
        assert_eq!(start.date_naive(), date);
        assert_eq!(start.hour(), 1);

        let previous = NaiveDate::from_ymd_opt(2018, 11, 3).unwrap();
        let (_, end) = resolve_day_window(previous, "America/Sao_Paulo").unwrap();
        assert_eq!(end.date_naive(), previous);
        assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "23:59:59.999");
    }

    #[test]
    fn test_day_window_invalid_timezone() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(matches!(
            resolve_day_window(date, "Nowhere/Special"),
            Err(Error::InvalidTimezone(_))
        ));
    }

    #[test]
    fn test_next_fire_after() {
        let london: Tz = "Europe/London".parse().unwrap();

        // 07:00 BST, fire later today
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let next = next_fire_after(7, 30, london, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 6, 30, 0).unwrap());

        // Exactly at the fire time, move to tomorrow
        let next = next_fire_after(7, 30, london, next).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 6, 30, 0).unwrap());

        // Already passed today
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let next = next_fire_after(7, 30, london, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_next_fire_uses_local_date() {
        // 23:30 UTC on June 1st is already June 2nd in Helsinki
        let helsinki: Tz = "Europe/Helsinki".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        let next = next_fire_after(6, 0, helsinki, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 2, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_next_fire_in_dst_gap() {
        let london: Tz = "Europe/London".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 30, 12, 0, 0).unwrap();

        // 01:30 does not exist on 2024-03-31, fires at 02:30 BST
        let next = next_fire_after(1, 30, london, now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 31, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_next_fire_in_dst_overlap_fires_once() {
        let london: Tz = "Europe/London".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 10, 26, 12, 0, 0).unwrap();

        // 01:30 happens twice on 2024-10-27, the earlier one wins
        let first = next_fire_after(1, 30, london, now).unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());

        let second = next_fire_after(1, 30, london, first).unwrap();
        assert_eq!(second, Utc.with_ymd_and_hms(2024, 10, 28, 1, 30, 0).unwrap());
    }

    #[test]
    fn test_local_date_offset() {
        let helsinki: Tz = "Europe/Helsinki".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 12, 31, 22, 30, 0).unwrap();
        assert_eq!(
            local_date_offset(now, helsinki, 1),
            NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
        );
    }
}
