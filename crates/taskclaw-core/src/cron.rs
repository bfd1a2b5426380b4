//! Cron expression grammar.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Field items: `*`, `N`, `a-b`, `*/n`, `a-b/n`, and comma lists of those.
//! Aliases: @yearly @annually @monthly @weekly @daily @midnight @hourly
//! Example: "0 8 * * 1-5" = weekdays at 8:00
//!
//! Day-of-month and day-of-week are ORed when both are restricted, like
//! classic cron. Weekday 0 is Sunday.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, Timelike, Utc};

use crate::error::{Result, TaskclawError};

/// Next-occurrence search gives up after one year of minutes.
pub const SEARCH_HORIZON_MINUTES: u32 = 366 * 24 * 60;

const ALIASES: &[(&str, &str)] = &[
    ("@yearly", "0 0 1 1 *"),
    ("@annually", "0 0 1 1 *"),
    ("@monthly", "0 0 1 * *"),
    ("@weekly", "0 0 * * 0"),
    ("@daily", "0 0 * * *"),
    ("@midnight", "0 0 * * *"),
    ("@hourly", "0 * * * *"),
];

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Expand a named alias to its 5-field form. Non-aliases pass through.
pub fn expand_alias(expression: &str) -> &str {
    let trimmed = expression.trim();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == trimmed)
        .map(|(_, expanded)| *expanded)
        .unwrap_or(trimmed)
}

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1u64 << value;
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days: FieldSet,
    months: FieldSet,
    weekdays: FieldSet,
    day_restricted: bool,
    weekday_restricted: bool,
}

impl CronExpr {
    /// Parse an expression (aliases accepted).
    pub fn parse(expression: &str) -> Result<Self> {
        let expanded = expand_alias(expression);
        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(TaskclawError::cron(
                expression,
                format!("need 5 fields (MIN HOUR DOM MON DOW), got {}", fields.len()),
            ));
        }

        let field = |idx: usize, min: u32, max: u32| {
            parse_field(fields[idx], min, max).map_err(|reason| TaskclawError::cron(expression, reason))
        };

        Ok(Self {
            source: expression.trim().to_string(),
            minutes: field(0, 0, 59)?,
            hours: field(1, 0, 23)?,
            days: field(2, 1, 31)?,
            months: field(3, 1, 12)?,
            weekdays: field(4, 0, 6)?,
            day_restricted: fields[2] != "*",
            weekday_restricted: fields[4] != "*",
        })
    }

    /// The expression as written (alias or 5-field form).
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the wall-clock time `dt` matches this expression.
    pub fn matches<Tz: chrono::TimeZone>(&self, dt: &DateTime<Tz>) -> bool {
        if !self.minutes.contains(dt.minute())
            || !self.hours.contains(dt.hour())
            || !self.months.contains(dt.month())
        {
            return false;
        }

        let day_match = self.days.contains(dt.day());
        let weekday_match = self.weekdays.contains(dt.weekday().num_days_from_sunday());
        if self.day_restricted && self.weekday_restricted {
            day_match || weekday_match
        } else {
            day_match && weekday_match
        }
    }

    /// First matching minute strictly after `from`, evaluated in UTC.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_after_in(from, Utc.fix())
    }

    /// First matching minute strictly after `from`, with fields read as
    /// wall-clock time in `offset`.
    pub fn next_after_in(&self, from: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let local = from.with_timezone(&offset);
        let mut candidate = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        for _ in 0..SEARCH_HORIZON_MINUTES {
            if self.matches(&candidate) {
                return Some(candidate.with_timezone(&Utc));
            }
            candidate += Duration::minutes(1);
        }
        None
    }

    /// Short English description.
    pub fn describe(&self) -> String {
        match self.source.as_str() {
            "@yearly" | "@annually" => return "once a year (Jan 1 at 00:00)".into(),
            "@monthly" => return "once a month (day 1 at 00:00)".into(),
            "@weekly" => return "once a week (Sunday at 00:00)".into(),
            "@daily" | "@midnight" => return "once a day (00:00)".into(),
            "@hourly" => return "every hour".into(),
            _ => {}
        }

        let fields: Vec<&str> = self.source.split_whitespace().collect();
        let [minute, hour, day, month, weekday] = fields[..] else {
            return self.source.clone();
        };

        let mut parts = Vec::new();

        match (minute, hour) {
            ("*", "*") => parts.push("every minute".to_string()),
            (m, "*") => match m.strip_prefix("*/") {
                Some(step) => parts.push(format!("every {step} minutes")),
                None => parts.push(format!("at minute {m} of every hour")),
            },
            (m, h) => {
                if let (Ok(m), Ok(h)) = (m.parse::<u32>(), h.parse::<u32>()) {
                    parts.push(format!("at {h:02}:{m:02}"));
                } else {
                    match m.strip_prefix("*/") {
                        Some(step) => parts.push(format!("every {step} minutes")),
                        None if m == "*" => parts.push("every minute".into()),
                        None => parts.push(format!("at minute {m}")),
                    }
                    match h.strip_prefix("*/") {
                        Some(step) => parts.push(format!("every {step} hours")),
                        None => parts.push(format!("during hour {h}")),
                    }
                }
            }
        }

        match day {
            "*" => {
                if weekday == "*" && hour != "*" {
                    parts.push("every day".into());
                }
            }
            d => match d.strip_prefix("*/") {
                Some(step) => parts.push(format!("every {step} days")),
                None => parts.push(format!("on day {d} of the month")),
            },
        }

        if month != "*" {
            match month.strip_prefix("*/") {
                Some(step) => parts.push(format!("every {step} months")),
                None => parts.push(format!("in month {month}")),
            }
        }

        if weekday != "*" {
            let names: Option<Vec<&str>> = weekday
                .split(',')
                .map(|w| w.parse::<usize>().ok().and_then(|i| WEEKDAY_NAMES.get(i).copied()))
                .collect();
            match names {
                Some(names) => parts.push(format!("on {}", names.join(", "))),
                None => parts.push(format!("on weekdays {weekday}")),
            }
        }

        parts.join(" ")
    }
}

impl FromStr for CronExpr {
    type Err = TaskclawError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compute the next occurrence after `from` in UTC.
pub fn next_occurrence(expression: &str, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    CronExpr::parse(expression)?
        .next_after(from)
        .ok_or_else(|| TaskclawError::cron(expression, "no occurrence found within one year"))
}

/// Whether `expression` parses.
pub fn is_valid(expression: &str) -> bool {
    CronExpr::parse(expression).is_ok()
}

/// Parse one field into its set of allowed values.
fn parse_field(field: &str, min: u32, max: u32) -> std::result::Result<FieldSet, String> {
    let mut set = FieldSet(0);

    if field == "*" {
        for v in min..=max {
            set.insert(v);
        }
        return Ok(set);
    }

    for item in field.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(format!("empty list item in '{field}'"));
        }

        // */N matches every value divisible by N
        if let Some(step) = item.strip_prefix("*/") {
            let n = parse_step(step)?;
            for v in (min..=max).filter(|v| v % n == 0) {
                set.insert(v);
            }
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(parse_step(step)?)),
            None => (item, None),
        };

        let (start, end) = match range.split_once('-') {
            Some((a, b)) => (parse_value(a, min, max)?, parse_value(b, min, max)?),
            None => {
                let v = parse_value(range, min, max)?;
                (v, if step.is_some() { max } else { v })
            }
        };
        if start > end {
            return Err(format!("range {start}-{end} is reversed"));
        }

        for v in (start..=end).step_by(step.unwrap_or(1) as usize) {
            set.insert(v);
        }
    }

    Ok(set)
}

fn parse_value(raw: &str, min: u32, max: u32) -> std::result::Result<u32, String> {
    let v: u32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if v < min || v > max {
        return Err(format!("{v} is outside {min}-{max}"));
    }
    Ok(v)
}

fn parse_step(raw: &str) -> std::result::Result<u32, String> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err("step must be greater than zero".into()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{raw}' is not a valid step")),
    }
}

/// Parse interval shorthand: `30s`, `5m`, `2h`, `1d`. Returns seconds.
pub fn parse_interval(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_ascii_lowercase();
    let unit = raw.chars().last()?;
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return None,
    };
    let digits = &raw[..raw.len() - 1];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// Human description of an interval given in seconds.
pub fn describe_interval(seconds: u64) -> String {
    fn unit(n: u64, word: &str) -> String {
        if n == 1 {
            format!("1 {word}")
        } else {
            format!("{n} {word}s")
        }
    }

    let (major, minor) = if seconds < 60 {
        (unit(seconds, "second"), None)
    } else if seconds < 3600 {
        (unit(seconds / 60, "minute"), Some(unit(seconds % 60, "second")).filter(|_| seconds % 60 != 0))
    } else if seconds < 86_400 {
        let rest = (seconds % 3600) / 60;
        (unit(seconds / 3600, "hour"), Some(unit(rest, "minute")).filter(|_| rest != 0))
    } else {
        let rest = (seconds % 86_400) / 3600;
        (unit(seconds / 86_400, "day"), Some(unit(rest, "hour")).filter(|_| rest != 0))
    };

    match minor {
        Some(minor) => format!("every {major} {minor}"),
        None => format!("every {major}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_every_hour() {
        let next = next_occurrence("0 * * * *", at(2026, 2, 22, 10, 30)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 11, 0));
    }

    #[test]
    fn test_specific_time() {
        let next = next_occurrence("0 8 * * *", at(2026, 2, 22, 7, 0)).unwrap();
        assert_eq!(next, at(2026, 2, 22, 8, 0));
    }

    #[test]
    fn test_every_15_minutes() {
        let next = next_occurrence("*/15 * * * *", at(2026, 2, 22, 10, 2)).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_strictly_after_from() {
        // Exactly on a matching minute still advances.
        let from = at(2026, 2, 22, 8, 0);
        let next = next_occurrence("0 8 * * *", from).unwrap();
        assert_eq!(next, at(2026, 2, 23, 8, 0));
    }

    #[test]
    fn test_monotonic_advance() {
        let expr = CronExpr::parse("*/7 3-5 * * 1,3").unwrap();
        let mut from = at(2026, 1, 1, 0, 0);
        for _ in 0..50 {
            let next = expr.next_after(from).unwrap();
            assert!(next > from);
            from = next;
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(expand_alias("@daily"), "0 0 * * *");
        assert_eq!(expand_alias("@hourly"), "0 * * * *");
        let from = at(2026, 3, 10, 13, 45);
        assert_eq!(
            next_occurrence("@daily", from).unwrap(),
            next_occurrence("0 0 * * *", from).unwrap()
        );
        assert_eq!(
            next_occurrence("@hourly", from).unwrap(),
            next_occurrence("0 * * * *", from).unwrap()
        );
        assert_eq!(next_occurrence("@annually", from).unwrap(), at(2027, 1, 1, 0, 0));
    }

    #[test]
    fn test_day_or_weekday() {
        // Day 3 OR Monday. 2026-06-03 is a Wednesday, 2026-06-08 a Monday.
        let expr = CronExpr::parse("0 9 3 * 1").unwrap();
        assert_eq!(expr.next_after(at(2026, 6, 2, 0, 0)).unwrap(), at(2026, 6, 3, 9, 0));
        assert_eq!(expr.next_after(at(2026, 6, 3, 9, 0)).unwrap(), at(2026, 6, 8, 9, 0));
    }

    #[test]
    fn test_day_and_weekday_when_one_is_wildcard() {
        let expr = CronExpr::parse("0 9 * * 0").unwrap();
        // 2026-06-07 is a Sunday.
        assert_eq!(expr.next_after(at(2026, 6, 2, 0, 0)).unwrap(), at(2026, 6, 7, 9, 0));
    }

    #[test]
    fn test_range_step_and_lists() {
        let expr = CronExpr::parse("0-30/10 1-5,10 * * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 1, 10, 20)));
        assert!(expr.matches(&at(2026, 1, 1, 3, 30)));
        assert!(!expr.matches(&at(2026, 1, 1, 6, 0)));
        assert!(!expr.matches(&at(2026, 1, 1, 1, 35)));
    }

    #[test]
    fn test_step_divides_value() {
        let expr = CronExpr::parse("0 0 */10 * *").unwrap();
        assert!(expr.matches(&at(2026, 1, 10, 0, 0)));
        assert!(!expr.matches(&at(2026, 1, 1, 0, 0)));
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(!is_valid("bad"));
        assert!(!is_valid("60 * * * *"));
        assert!(!is_valid("* 24 * * *"));
        assert!(!is_valid("* * 0 * *"));
        assert!(!is_valid("* * * 13 *"));
        assert!(!is_valid("* * * * 7"));
        assert!(!is_valid("*/0 * * * *"));
        assert!(!is_valid("5-1 * * * *"));
        assert!(!is_valid("* * * *"));
    }

    #[test]
    fn test_no_occurrence_within_year() {
        // Feb 30 never exists.
        let err = next_occurrence("0 0 30 2 *", at(2026, 1, 1, 0, 0)).unwrap_err();
        assert!(err.to_string().contains("no occurrence"));
    }

    #[test]
    fn test_offset_evaluation() {
        let expr = CronExpr::parse("0 8 * * *").unwrap();
        let plus8 = FixedOffset::east_opt(8 * 3600).unwrap();
        // 08:00 at +08:00 is 00:00 UTC.
        let next = expr.next_after_in(at(2026, 5, 1, 12, 0), plus8).unwrap();
        assert_eq!(next, at(2026, 5, 2, 0, 0));
    }

    #[test]
    fn test_describe() {
        assert_eq!(CronExpr::parse("@daily").unwrap().describe(), "once a day (00:00)");
        assert_eq!(CronExpr::parse("30 8 * * *").unwrap().describe(), "at 08:30 every day");
        assert_eq!(CronExpr::parse("*/5 * * * *").unwrap().describe(), "every 5 minutes");
        assert_eq!(CronExpr::parse("0 9 * * 1,5").unwrap().describe(), "at 09:00 on Mon, Fri");
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("30s"), Some(30));
        assert_eq!(parse_interval("5m"), Some(300));
        assert_eq!(parse_interval("2H"), Some(7200));
        assert_eq!(parse_interval("1d"), Some(86_400));
        assert_eq!(parse_interval("m"), None);
        assert_eq!(parse_interval("10x"), None);
        assert_eq!(parse_interval("-5m"), None);
    }

    #[test]
    fn test_describe_interval() {
        assert_eq!(describe_interval(45), "every 45 seconds");
        assert_eq!(describe_interval(60), "every 1 minute");
        assert_eq!(describe_interval(90), "every 1 minute 30 seconds");
        assert_eq!(describe_interval(7200), "every 2 hours");
        assert_eq!(describe_interval(90_000), "every 1 day 1 hour");
    }
}
