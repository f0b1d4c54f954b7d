// src/utils/date.rs

//! Normalization of the site's human-readable publish times.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDateTime};
use regex::Regex;

const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

static RELATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(秒|分钟|小时)").expect("valid regex"));
static TODAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^今天(\d{1,2}:\d{2})").expect("valid regex"));
static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})月(\d{1,2})日\s*(\d{1,2}:\d{2})").expect("valid regex")
});
static FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日\s*(\d{1,2}:\d{2})").expect("valid regex")
});

/// Turn a publish time such as `5分钟`, `今天08:30` or `11月20日 08:30` into
/// `YYYY-MM-DD HH:MM`, relative to `now`.
///
/// The input is expected without the trailing `前`. Unrecognized text is
/// returned unchanged.
pub fn standardize_date(raw: &str, now: NaiveDateTime) -> String {
    let text = raw.trim();

    if text.contains("刚刚") {
        return now.format(OUTPUT_FORMAT).to_string();
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let offset = caps[1].parse::<i64>().ok().and_then(|amount| match &caps[2] {
            "秒" => Duration::try_seconds(amount),
            "分钟" => Duration::try_minutes(amount),
            _ => Duration::try_hours(amount),
        });
        // Out-of-range amounts keep the site's wording.
        return match offset.and_then(|offset| now.checked_sub_signed(offset)) {
            Some(instant) => instant.format(OUTPUT_FORMAT).to_string(),
            None => text.to_string(),
        };
    }

    if let Some(caps) = TODAY.captures(text) {
        return format!("{} {}", now.format("%Y-%m-%d"), pad_time(&caps[1]));
    }

    if let Some(caps) = FULL_DATE.captures(text) {
        return format!(
            "{}-{:0>2}-{:0>2} {}",
            &caps[1],
            &caps[2],
            &caps[3],
            pad_time(&caps[4])
        );
    }

    if let Some(caps) = MONTH_DAY.captures(text) {
        return format!(
            "{}-{:0>2}-{:0>2} {}",
            now.year(),
            &caps[1],
            &caps[2],
            pad_time(&caps[3])
        );
    }

    text.to_string()
}

fn pad_time(time: &str) -> String {
    format!("{time:0>5}")
}
