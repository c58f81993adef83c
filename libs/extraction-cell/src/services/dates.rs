//! Deterministic resolution of spoken time expressions ("next Tuesday at 3pm",
//! "tomorrow morning", "sometime next week") against a reference instant.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use regex::{Captures, Regex};

use crate::models::AppointmentTime;

const WEEKDAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues|tue|wed|thurs|thur|thu|fri";
const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

const DAY_OPEN: u32 = 8;
const DAY_CLOSE: u32 = 20;

/// Furthest "in N days/weeks" offset taken at face value.
const MAX_OFFSET_DAYS: i64 = 730;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfDay {
    Morning,
    Afternoon,
    Evening,
}

impl PartOfDay {
    fn hours(&self) -> (u32, u32) {
        match self {
            PartOfDay::Morning => (8, 12),
            PartOfDay::Afternoon => (12, 17),
            PartOfDay::Evening => (17, 20),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub when: AppointmentTime,
    pub needs_confirmation: bool,
}

impl Resolution {
    fn unresolved() -> Self {
        Self {
            when: AppointmentTime::Unresolved,
            needs_confirmation: true,
        }
    }

    fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            when: AppointmentTime::Window { start, end },
            needs_confirmation: true,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.when, AppointmentTime::Unresolved)
    }
}

/// What could be read out of an expression before anything is anchored to a date.
#[derive(Debug, Default, PartialEq)]
struct Reading {
    day: Option<NaiveDate>,
    time: Option<NaiveTime>,
    part: Option<PartOfDay>,
    vague_span: Option<(NaiveDate, NaiveDate)>,
    vague: bool,
    beyond_horizon: bool,
}

struct Patterns {
    iso_date: Regex,
    relative_word: Regex,
    in_offset: Regex,
    next_week_day: Regex,
    next_day: Regex,
    this_day: Regex,
    month_day: Regex,
    day_month: Regex,
    clock_12h: Regex,
    clock_24h: Regex,
    noon: Regex,
    part: Regex,
    vague_word: Regex,
    vague_span: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |pattern: String| Regex::new(&pattern).unwrap_or_else(|e| panic!("invalid date pattern: {e}"));
        Patterns {
            iso_date: build(r"\b(\d{4})-(\d{2})-(\d{2})\b".to_string()),
            relative_word: build(r"\b(day after tomorrow|tomorrow|today|tonight)\b".to_string()),
            in_offset: build(r"\bin\s+(\d+|a|an|one|two|three|four|five|six|seven)\s+(days?|weeks?)\b".to_string()),
            next_week_day: build(format!(
                r"\bnext\s+week\s+(?:on\s+)?({WEEKDAYS})\b|\b({WEEKDAYS})\s+(?:of\s+)?next\s+week\b"
            )),
            next_day: build(format!(r"\bnext\s+({WEEKDAYS})\b")),
            this_day: build(format!(r"\b(?:this\s+|on\s+)?({WEEKDAYS})\b")),
            month_day: build(format!(r"\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b")),
            day_month: build(format!(r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b")),
            clock_12h: build(r"\b(\d{1,2})(?::([0-5]\d))?\s*(am\b|pm\b|a\.m\.|p\.m\.)".to_string()),
            clock_24h: build(r"\b([01]?\d|2[0-3]):([0-5]\d)\b".to_string()),
            noon: build(r"\b(noon|midday)\b".to_string()),
            part: build(r"\b(morning|afternoon|evening|tonight)\b".to_string()),
            vague_word: build(r"\b(sometime|some time|whenever|soon|at some point|anytime|any time)\b".to_string()),
            vague_span: build(r"\b(next week|this week|next month)\b".to_string()),
        }
    })
}

/// Resolves `expression` against `reference`; exact starts get `duration` as their length.
pub fn resolve(expression: &str, reference: DateTime<Utc>, duration: Duration) -> Resolution {
    let text = expression.trim().to_lowercase();
    if text.is_empty() {
        return Resolution::unresolved();
    }

    let reading = read(&text, reference.date_naive());
    if reading.beyond_horizon {
        return Resolution::unresolved();
    }
    anchor(reading, reference, duration)
}

/// Resolves an already-structured date (and optional time), as reported by the model.
pub fn resolve_parts(
    date: NaiveDate,
    time: Option<NaiveTime>,
    reference: DateTime<Utc>,
    duration: Duration,
) -> Resolution {
    let reading = Reading {
        day: Some(date),
        time,
        ..Reading::default()
    };
    anchor(reading, reference, duration)
}

fn read(text: &str, today: NaiveDate) -> Reading {
    let p = patterns();
    let mut reading = Reading {
        day: read_day(text, today),
        beyond_horizon: p.in_offset.captures(text).is_some_and(|caps| offset_days(&caps).is_none()),
        ..Reading::default()
    };

    reading.time = if let Some(caps) = p.clock_12h.captures(text) {
        clock_12h(&caps)
    } else if let Some(caps) = p.clock_24h.captures(text) {
        let hour = caps[1].parse().unwrap_or(99);
        let minute = caps[2].parse().unwrap_or(99);
        NaiveTime::from_hms_opt(hour, minute, 0)
    } else if p.noon.is_match(text) {
        NaiveTime::from_hms_opt(12, 0, 0)
    } else {
        None
    };

    reading.part = p.part.captures(text).map(|caps| match &caps[1] {
        "morning" => PartOfDay::Morning,
        "afternoon" => PartOfDay::Afternoon,
        _ => PartOfDay::Evening,
    });

    reading.vague = p.vague_word.is_match(text);

    if reading.day.is_none() {
        if let Some(caps) = p.vague_span.captures(text) {
            reading.vague_span = Some(span(&caps[1], today));
            reading.vague = true;
        }
    }

    reading
}

fn read_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let p = patterns();

    if let Some(caps) = p.iso_date.captures(text) {
        let (y, m, d) = (caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?);
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    if let Some(caps) = p.relative_word.captures(text) {
        let offset = match &caps[1] {
            "day after tomorrow" => 2,
            "tomorrow" => 1,
            _ => 0,
        };
        return Some(today + Duration::days(offset));
    }

    if let Some(caps) = p.in_offset.captures(text) {
        let days = offset_days(&caps)?;
        return today.checked_add_signed(Duration::try_days(days)?);
    }

    if let Some(caps) = p.next_week_day.captures(text) {
        let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let weekday = weekday(name)?;
        let next_monday = today + Duration::days(7 - today.weekday().num_days_from_monday() as i64);
        return Some(next_monday + Duration::days(weekday.num_days_from_monday() as i64));
    }

    if let Some(caps) = p.next_day.captures(text) {
        let weekday = weekday(&caps[1])?;
        return Some(upcoming(today, weekday, 1));
    }

    if let Some(caps) = p.month_day.captures(text) {
        return next_calendar_day(today, month(&caps[1])?, caps[2].parse().ok()?);
    }

    if let Some(caps) = p.day_month.captures(text) {
        return next_calendar_day(today, month(&caps[2])?, caps[1].parse().ok()?);
    }

    if let Some(caps) = p.this_day.captures(text) {
        let weekday = weekday(&caps[1])?;
        return Some(upcoming(today, weekday, 0));
    }

    None
}

fn anchor(reading: Reading, reference: DateTime<Utc>, duration: Duration) -> Resolution {
    let today = reference.date_naive();

    match (reading.day, reading.time, reading.part) {
        (Some(day), Some(time), _) if !reading.vague => {
            let start = at(day, time);
            // A day that has already passed is a likely mishearing.
            slot(start, duration, start <= reference)
        }
        (Some(day), _, Some(part)) => part_window(day, part),
        (Some(day), _, None) => day_window(day),
        (None, Some(time), _) if !reading.vague && reading.vague_span.is_none() => {
            let mut start = at(today, time);
            if start <= reference {
                start += Duration::days(1);
            }
            slot(start, duration, true)
        }
        (None, _, part) => match (reading.vague_span, part) {
            (Some((from, to)), _) => Resolution::window(at_hour(from, DAY_OPEN), at_hour(to, DAY_CLOSE)),
            (None, Some(part)) => {
                let (_, close) = part.hours();
                let day = if reference < at_hour(today, close) { today } else { today + Duration::days(1) };
                part_window(day, part)
            }
            (None, None) => Resolution::unresolved(),
        },
    }
}

fn slot(start: DateTime<Utc>, duration: Duration, needs_confirmation: bool) -> Resolution {
    match start.checked_add_signed(duration) {
        Some(end) if end > start => Resolution {
            when: AppointmentTime::Exact { start, end },
            needs_confirmation,
        },
        _ => Resolution::unresolved(),
    }
}

fn part_window(day: NaiveDate, part: PartOfDay) -> Resolution {
    let (open, close) = part.hours();
    Resolution::window(at_hour(day, open), at_hour(day, close))
}

fn day_window(day: NaiveDate) -> Resolution {
    Resolution::window(at_hour(day, DAY_OPEN), at_hour(day, DAY_CLOSE))
}

fn span(phrase: &str, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    match phrase {
        "this week" => (today, monday + Duration::days(6)),
        "next month" => {
            let (year, month) = if today.month() == 12 { (today.year() + 1, 1) } else { (today.year(), today.month() + 1) };
            let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today);
            let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            let last = NaiveDate::from_ymd_opt(next_year, next_month, 1)
                .map(|d| d - Duration::days(1))
                .unwrap_or(first);
            (first, last)
        }
        _ => (monday + Duration::days(7), monday + Duration::days(13)),
    }
}

/// The first `weekday` at least `min_days` after `today`.
fn upcoming(today: NaiveDate, weekday: Weekday, min_days: i64) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut offset = (target - current).rem_euclid(7);
    if offset < min_days {
        offset += 7;
    }
    today + Duration::days(offset)
}

fn next_calendar_day(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

fn clock_12h(caps: &Captures) -> Option<NaiveTime> {
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
    if !(1..=12).contains(&hour) {
        return None;
    }
    let pm = caps[3].starts_with('p');
    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, true) => h + 12,
        (h, false) => h,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn at(day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(time))
}

fn at_hour(day: NaiveDate, hour: u32) -> DateTime<Utc> {
    at(day, NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN))
}

fn weekday(name: &str) -> Option<Weekday> {
    Some(match &name[..3] {
        "mon" => Weekday::Mon,
        "tue" => Weekday::Tue,
        "wed" => Weekday::Wed,
        "thu" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "sat" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    })
}

fn month(name: &str) -> Option<u32> {
    let index = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ]
    .iter()
    .position(|prefix| name.starts_with(prefix))?;
    Some(index as u32 + 1)
}

fn offset_days(caps: &Captures) -> Option<i64> {
    let count = small_number(&caps[1])?;
    let days = if caps[2].starts_with("week") { count.checked_mul(7)? } else { count };
    (days <= MAX_OFFSET_DAYS).then_some(days)
}

fn small_number(word: &str) -> Option<i64> {
    match word {
        "a" | "an" | "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        "seven" => Some(7),
        digits => digits.parse().ok(),
    }
}
