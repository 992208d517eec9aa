//! Schedule modes, time-string grammars, and next-run computation.
//!
//! A [`Schedule`] is a tagged variant over the four period modes: a fixed
//! interval (`Every`) or a calendar anchor (`Day`/`Week`/`Month`). The
//! next-run algorithm lives here as pure functions over `NaiveDateTime`, so
//! the whole of the date arithmetic is testable without a worker or a real
//! clock.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// What to do with due times missed while the worker was busy or the clock
/// jumped forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchUpPolicy {
    /// Skip missed occurrences silently and land on the correct future
    /// anchor; the job fires at most once per due check.
    #[default]
    SkipMissed,
    /// Advance by exactly one period per execution, letting the poll loop
    /// replay every missed occurrence one tick at a time.
    ReplayMissed,
}

/// A task's period configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schedule {
    /// Fire at a fixed interval, starting immediately.
    Every { interval: std::time::Duration },
    /// Fire every day at the anchor time.
    Day { at: NaiveTime },
    /// Fire every week on the anchor weekday at the anchor time.
    Week { at: NaiveTime, weekday: Weekday },
    /// Fire every month on the anchor day (1-31) at the anchor time.
    /// Months lacking the anchor day are skipped entirely.
    Month { at: NaiveTime, day: u32 },
}

impl Schedule {
    /// The first due time after activation.
    pub fn initial_run(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            Schedule::Every { .. } => now,
            Schedule::Day { at } => {
                let run = now.date().and_time(*at);
                if run < now {
                    run + Duration::days(1)
                } else {
                    run
                }
            }
            Schedule::Week { at, weekday } => {
                align_weekday(now.date().and_time(*at), *weekday, now)
            }
            Schedule::Month { at, day } => month_anchor_from(now, *day, *at),
        }
    }

    /// The due time following an execution whose due time was `last`.
    pub fn next_run(
        &self,
        last: NaiveDateTime,
        now: NaiveDateTime,
        policy: CatchUpPolicy,
    ) -> NaiveDateTime {
        match self {
            Schedule::Every { interval } => {
                let interval = Duration::from_std(*interval).unwrap_or_else(|_| Duration::MAX);
                match policy {
                    CatchUpPolicy::SkipMissed => {
                        let mut next = last + interval;
                        if next < now {
                            // Jump over the whole backlog in one step rather
                            // than replaying each missed interval.
                            if let Some(micros) =
                                interval.num_microseconds().filter(|micros| *micros > 0)
                            {
                                let behind =
                                    (now - last).num_microseconds().unwrap_or(i64::MAX);
                                // behind > 0 here, so this rounds up
                                let steps = (behind - 1) / micros + 1;
                                next = last
                                    + Duration::microseconds(micros.saturating_mul(steps));
                            }
                        }
                        if next == now {
                            next += interval;
                        }
                        next
                    }
                    CatchUpPolicy::ReplayMissed => last + interval,
                }
            }
            Schedule::Day { at } => match policy {
                CatchUpPolicy::SkipMissed => {
                    let mut next = last + Duration::days(1);
                    if next < now {
                        next = now.date().and_time(*at);
                    }
                    if next <= now {
                        next += Duration::days(1);
                    }
                    next
                }
                CatchUpPolicy::ReplayMissed => last + Duration::days(1),
            },
            Schedule::Week { at, weekday } => match policy {
                CatchUpPolicy::SkipMissed => {
                    let mut next = last + Duration::days(7);
                    if next < now {
                        next = align_weekday(now.date().and_time(*at), *weekday, now);
                    }
                    if next <= now {
                        next += Duration::days(7);
                    }
                    next
                }
                CatchUpPolicy::ReplayMissed => last + Duration::days(7),
            },
            Schedule::Month { at, day } => match policy {
                CatchUpPolicy::SkipMissed => {
                    let mut next = month_following(last);
                    if next < now {
                        next = month_anchor_from(now, *day, *at);
                    }
                    if next <= now {
                        next = month_following(next);
                    }
                    next
                }
                CatchUpPolicy::ReplayMissed => month_following(last),
            },
        }
    }
}

/// Move `candidate` forward to the nearest occurrence of `target` weekday.
///
/// If `candidate` already sits on the target weekday but its time has
/// passed relative to `now`, advance a full week.
fn align_weekday(candidate: NaiveDateTime, target: Weekday, now: NaiveDateTime) -> NaiveDateTime {
    let cur = candidate.weekday().num_days_from_monday() as i64;
    let tgt = target.num_days_from_monday() as i64;
    if cur < tgt {
        candidate + Duration::days(tgt - cur)
    } else if cur > tgt {
        candidate + Duration::days(7 + tgt - cur)
    } else if candidate < now {
        candidate + Duration::days(7)
    } else {
        candidate
    }
}

/// The first month strictly after (`year`, `month`) that contains `day`.
///
/// No two consecutive months both lack a day, so this advances at most two
/// months for any day in 1-31.
fn next_month_with_day(mut year: i32, mut month: u32, day: u32) -> NaiveDate {
    loop {
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return date;
        }
    }
}

/// Advance a month-mode due time to the next month containing its day,
/// keeping the time of day.
fn month_following(last: NaiveDateTime) -> NaiveDateTime {
    next_month_with_day(last.year(), last.month(), last.day()).and_time(last.time())
}

/// The nearest month anchor at or after `now`: this month at `day`+`at` if
/// still ahead, otherwise the next month that has the anchor day.
fn month_anchor_from(now: NaiveDateTime, day: u32, at: NaiveTime) -> NaiveDateTime {
    match NaiveDate::from_ymd_opt(now.year(), now.month(), day) {
        Some(date) => {
            let candidate = date.and_time(at);
            if now.day() > day || (now.day() == day && candidate < now) {
                month_following(candidate)
            } else {
                candidate
            }
        }
        None => next_month_with_day(now.year(), now.month(), day).and_time(at),
    }
}

/// A time interval accepted by `delay` and `period`: whole seconds, a
/// duration value, or an `HH:MM:SS` string.
#[derive(Debug, Clone)]
pub enum Interval {
    /// Whole seconds.
    Seconds(u64),
    /// An explicit duration.
    Duration(std::time::Duration),
    /// A signed span, rejected on use if negative.
    Span(Duration),
    /// An `HH:MM:SS` string, validated on use.
    Text(String),
}

impl From<u64> for Interval {
    fn from(secs: u64) -> Self {
        Interval::Seconds(secs)
    }
}

impl From<u32> for Interval {
    fn from(secs: u32) -> Self {
        Interval::Seconds(secs as u64)
    }
}

impl From<std::time::Duration> for Interval {
    fn from(duration: std::time::Duration) -> Self {
        Interval::Duration(duration)
    }
}

impl From<Duration> for Interval {
    fn from(span: Duration) -> Self {
        Interval::Span(span)
    }
}

impl From<&str> for Interval {
    fn from(text: &str) -> Self {
        Interval::Text(text.to_string())
    }
}

impl From<String> for Interval {
    fn from(text: String) -> Self {
        Interval::Text(text)
    }
}

impl Interval {
    /// Resolve into a concrete duration, validating text grammar and range.
    pub(crate) fn resolve(&self) -> Result<Duration> {
        match self {
            Interval::Seconds(secs) => Duration::try_seconds(*secs as i64)
                .ok_or_else(|| Error::time_format(format!("interval out of range: {secs}s"))),
            Interval::Duration(duration) => Duration::from_std(*duration)
                .map_err(|_| Error::time_format("interval out of range".to_string())),
            Interval::Span(span) => {
                if *span < Duration::zero() {
                    return Err(Error::time_format("interval must not be negative".to_string()));
                }
                Ok(*span)
            }
            Interval::Text(text) => {
                let time = parse_clock_time(text)?;
                Ok(Duration::seconds(time.num_seconds_from_midnight() as i64))
            }
        }
    }

    pub(crate) fn resolve_std(&self) -> Result<std::time::Duration> {
        self.resolve()?
            .to_std()
            .map_err(|_| Error::time_format("interval must not be negative".to_string()))
    }
}

/// An absolute activation instant accepted by `start_at`: a datetime value
/// or a string, either `HH:MM:SS` (today) or `MM-DD HH:MM:SS` (this year).
#[derive(Debug, Clone)]
pub enum StartTime {
    /// An explicit instant.
    At(NaiveDateTime),
    /// A time string, resolved against the clock on use.
    Text(String),
}

impl From<NaiveDateTime> for StartTime {
    fn from(at: NaiveDateTime) -> Self {
        StartTime::At(at)
    }
}

impl From<&str> for StartTime {
    fn from(text: &str) -> Self {
        StartTime::Text(text.to_string())
    }
}

impl From<String> for StartTime {
    fn from(text: String) -> Self {
        StartTime::Text(text)
    }
}

impl StartTime {
    /// Resolve into an instant, interpreting bare times as today and
    /// month-day forms as the current year.
    pub(crate) fn resolve(&self, now: NaiveDateTime) -> Result<NaiveDateTime> {
        match self {
            StartTime::At(at) => Ok(*at),
            StartTime::Text(text) => {
                if text.contains(' ') {
                    let (month, day, time) = parse_month_day_time(text)?;
                    let date = NaiveDate::from_ymd_opt(now.year(), month, day).ok_or_else(
                        || Error::time_format(format!("no such date this year: {text:?}")),
                    )?;
                    Ok(date.and_time(time))
                } else {
                    Ok(now.date().and_time(parse_clock_time(text)?))
                }
            }
        }
    }
}

/// A time of day accepted by the calendar-anchor setters: a value or an
/// `HH:MM:SS` string.
#[derive(Debug, Clone)]
pub enum TimeOfDay {
    At(NaiveTime),
    Text(String),
}

impl From<NaiveTime> for TimeOfDay {
    fn from(at: NaiveTime) -> Self {
        TimeOfDay::At(at)
    }
}

impl From<&str> for TimeOfDay {
    fn from(text: &str) -> Self {
        TimeOfDay::Text(text.to_string())
    }
}

impl From<String> for TimeOfDay {
    fn from(text: String) -> Self {
        TimeOfDay::Text(text)
    }
}

impl TimeOfDay {
    pub(crate) fn resolve(&self) -> Result<NaiveTime> {
        match self {
            TimeOfDay::At(at) => Ok(*at),
            TimeOfDay::Text(text) => parse_clock_time(text),
        }
    }
}

/// A weekday accepted by the week-anchor setter: a value or an exact
/// case-sensitive English name.
#[derive(Debug, Clone)]
pub enum WeekdaySpec {
    Day(Weekday),
    Name(String),
}

impl From<Weekday> for WeekdaySpec {
    fn from(weekday: Weekday) -> Self {
        WeekdaySpec::Day(weekday)
    }
}

impl From<&str> for WeekdaySpec {
    fn from(name: &str) -> Self {
        WeekdaySpec::Name(name.to_string())
    }
}

impl From<String> for WeekdaySpec {
    fn from(name: String) -> Self {
        WeekdaySpec::Name(name)
    }
}

impl WeekdaySpec {
    pub(crate) fn resolve(&self) -> Result<Weekday> {
        match self {
            WeekdaySpec::Day(weekday) => Ok(*weekday),
            WeekdaySpec::Name(name) => parse_week_day(name),
        }
    }
}

/// Parse a 1-2 digit numeric field bounded by `min..=max`.
fn parse_field(part: &str, min: u32, max: u32) -> Option<u32> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = part.parse().ok()?;
    (min..=max).contains(&value).then_some(value)
}

/// Parse `HH:MM:SS` (hour 0-23, minute/second 0-59, 1-2 digits each).
pub(crate) fn parse_clock_time(text: &str) -> Result<NaiveTime> {
    let parts: Vec<&str> = text.split(':').collect();
    let err = || Error::time_format(format!("expected HH:MM:SS, got {text:?}"));
    if parts.len() != 3 {
        return Err(err());
    }
    let hour = parse_field(parts[0], 0, 23).ok_or_else(err)?;
    let minute = parse_field(parts[1], 0, 59).ok_or_else(err)?;
    let second = parse_field(parts[2], 0, 59).ok_or_else(err)?;
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(err)
}

/// Parse `MM-DD HH:MM:SS` (month 1-12, day 1-31).
pub(crate) fn parse_month_day_time(text: &str) -> Result<(u32, u32, NaiveTime)> {
    let err = || Error::time_format(format!("expected MM-DD HH:MM:SS, got {text:?}"));
    let (date_part, time_part) = text.split_once(' ').ok_or_else(err)?;
    let (month_part, day_part) = date_part.split_once('-').ok_or_else(err)?;
    let month = parse_field(month_part, 1, 12).ok_or_else(err)?;
    let day = parse_field(day_part, 1, 31).ok_or_else(err)?;
    let time = parse_clock_time(time_part)?;
    Ok((month, day, time))
}

/// Parse an exact case-sensitive English weekday name, Monday-first.
pub(crate) fn parse_week_day(name: &str) -> Result<Weekday> {
    match name {
        "Monday" => Ok(Weekday::Mon),
        "Tuesday" => Ok(Weekday::Tue),
        "Wednesday" => Ok(Weekday::Wed),
        "Thursday" => Ok(Weekday::Thu),
        "Friday" => Ok(Weekday::Fri),
        "Saturday" => Ok(Weekday::Sat),
        "Sunday" => Ok(Weekday::Sun),
        _ => Err(Error::time_format(format!("unknown weekday: {name:?}"))),
    }
}
