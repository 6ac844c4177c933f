// ABOUTME: Date normalization from platform date text to canonical YYYY-MM-DD strings.
// ABOUTME: Canonical shapes are always accepted first; unparseable input falls back to today.

//! Date normalization.
//!
//! Every [`DateStyle`] first accepts the canonical shapes (`YYYY-MM-DD HH:MM:SS`,
//! `YYYY-MM-DD HH:MM`, `YYYY-MM-DD`), so feeding a normalized date back in
//! returns it unchanged. Normalization never fails: text no style understands
//! becomes today's date.

use chrono::{Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::platform::DateStyle;

const CANONICAL: &str = "%Y-%m-%d";

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

static FULL_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})").expect("valid regex"));
static MONTH_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})").expect("valid regex"));
static CLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}").expect("valid regex"));
static DAYS_AGO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:天|days?)\s*(?:前|ago)").expect("valid regex")
});
static MONTHS_AGO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:个月|months?)\s*(?:前|ago)").expect("valid regex")
});
static WITHIN_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d+\s*(?:小时|分钟|秒|hours?|minutes?|mins?|seconds?)\s*(?:前|ago)")
        .expect("valid regex")
});
static EMBEDDED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}).*?(\d{1,2}).*?(\d{1,2})").expect("valid regex"));
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*月\s*(\d+)\s*日").expect("valid regex"));

/// Normalize date text against today's local date.
pub fn normalize_date(raw: &str, style: DateStyle) -> String {
    normalize_date_at(raw, style, Local::now().date_naive())
}

/// Normalize date text relative to `today`.
pub fn normalize_date_at(raw: &str, style: DateStyle, today: NaiveDate) -> String {
    let text = raw.trim();
    let parsed = parse_canonical(text).or_else(|| match style {
        DateStyle::Standard => None,
        DateStyle::Relative => parse_relative(text, today),
        DateStyle::Embedded => parse_embedded(text),
        DateStyle::MonthDay => parse_month_day(text, today),
    });

    match parsed {
        Some(date) => date.format(CANONICAL).to_string(),
        None => {
            if !text.is_empty() {
                tracing::debug!(raw = text, ?style, "Unrecognized date text, using today");
            }
            today.format(CANONICAL).to_string()
        }
    }
}

/// Today's date in canonical form.
pub fn today() -> String {
    Local::now().date_naive().format(CANONICAL).to_string()
}

fn parse_canonical(text: &str) -> Option<NaiveDate> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    NaiveDate::parse_from_str(text, CANONICAL).ok()
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn parse_relative(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_lowercase();
    if text.contains("前天") || lower.contains("day before yesterday") {
        return today.checked_sub_signed(Duration::days(2));
    }
    if text.contains("昨天") || lower.contains("yesterday") {
        return today.checked_sub_signed(Duration::days(1));
    }
    if text.contains("刚刚") || text.contains("今天") || lower.contains("just now") || lower.contains("today") {
        return Some(today);
    }

    if let Some(caps) = DAYS_AGO_RE.captures(text) {
        let days: i64 = caps[1].parse().ok()?;
        return Duration::try_days(days).and_then(|d| today.checked_sub_signed(d));
    }
    if let Some(caps) = MONTHS_AGO_RE.captures(text) {
        let months: u32 = caps[1].parse().ok()?;
        return today.checked_sub_months(Months::new(months));
    }
    if WITHIN_DAY_RE.is_match(text) {
        return Some(today);
    }

    if let Some(caps) = FULL_SLASH_RE.captures(text) {
        return ymd(&caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = MONTH_SLASH_RE.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let mut year = today.year();
        if (month, day) > (today.month(), today.day()) {
            year -= 1;
        }
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    if CLOCK_RE.is_match(text) {
        return Some(today);
    }
    None
}

fn parse_embedded(text: &str) -> Option<NaiveDate> {
    let caps = EMBEDDED_RE.captures(text)?;
    ymd(&caps[1], &caps[2], &caps[3])
}

fn parse_month_day(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = MONTH_DAY_RE.captures(text)?;
    NaiveDate::from_ymd_opt(today.year(), caps[1].parse().ok()?, caps[2].parse().ok()?)
}
