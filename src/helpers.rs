//! Shared parsing utilities used across the scraper:
//! - date normalization for the site's free-text date fields
//! - text extraction from HTML elements
//! - counting entries in string-embedded literal lists

use chrono::{Month, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Selector};

/// Normalize one of the site's free-text dates into `YYYY`, `YYYY-MM` or
/// `YYYY-MM-DD`. Unrecognized shapes pass through unchanged; "unknown" and
/// "not set" markers become `None`. This is best-effort, not a strict
/// parser.
pub fn normalize_date(raw: &str) -> Option<String> {
    let mut text = raw.trim().to_string();
    if text.is_empty() {
        return None;
    }
    let lower = text.to_lowercase();
    if lower.contains("unknown") || lower.contains("not set") {
        return None;
    }

    // "Mon, Jan 05, 2023 10:30AM" -> drop the weekday prefix and clock suffix
    let weekday = Regex::new(r"^\w+,\s*").unwrap();
    text = weekday.replace(&text, "").trim().to_string();
    let clock = Regex::new(r"\s+\d+:\d+(AM|PM)?$").unwrap();
    text = clock.replace(&text, "").trim().to_string();

    // "05, 2023" is what remains of a day-and-year form once the weekday
    // is stripped; only the year is trustworthy.
    if Regex::new(r"^\d{1,2},\s*\d{4}$").unwrap().is_match(&text) {
        let year = text.rsplit(',').next().unwrap_or("").trim();
        if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
            return Some(year.to_string());
        }
        return None;
    }

    if Regex::new(r"^[A-Za-z]{3,}\s+\d{1,2},\s+\d{4}$").unwrap().is_match(&text) {
        // chrono's %b accepts both full and abbreviated month names
        if let Ok(date) = NaiveDate::parse_from_str(&text, "%b %d, %Y") {
            return Some(date.format("%Y-%m-%d").to_string());
        }
        return Some(text);
    }

    if let Some(caps) = Regex::new(r"^([A-Za-z]{3,})\s+(\d{4})$").unwrap().captures(&text) {
        if let (Ok(month), Ok(year)) = (caps[1].parse::<Month>(), caps[2].parse::<i32>()) {
            return Some(format!("{}-{:02}", year, month.number_from_month()));
        }
        return Some(text);
    }

    if text.len() == 4 && text.chars().all(|c| c.is_ascii_digit()) {
        return Some(text);
    }

    Some(text)
}

/// Coerce a normalized date into a calendar date for bucketing: year-only
/// becomes January 1st, year-month becomes the 1st.
pub fn parse_bucket_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d") {
        return Some(date);
    }
    if s.len() == 4 {
        if let Ok(year) = s.parse::<i32>() {
            return NaiveDate::from_ymd_opt(year, 1, 1);
        }
    }
    None
}

/// Concatenated text of an element, chunks trimmed and joined with single
/// spaces.
pub fn element_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// First descendant matching `css`, or None when the selector misses (or
/// does not parse — field lookups must never take a row down).
pub fn select_first<'a>(el: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    Selector::parse(css).ok().and_then(|sel| el.select(&sel).next())
}

pub fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Character-safe prefix truncation.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Count the top-level elements of a string-embedded literal list such as
/// `"[{'id': 1}, {'id': 2}]"`. The upstream encodes this sub-field as a
/// literal rather than JSON, so it is scanned with quote- and
/// nesting-awareness instead of being decoded. Returns None for anything
/// that is not a balanced bracketed list.
pub fn literal_list_len(raw: &str) -> Option<usize> {
    let inner = raw.trim().strip_prefix('[')?.strip_suffix(']')?;
    if inner.trim().is_empty() {
        return Some(0);
    }
    let mut depth = 0i32;
    let mut count = 1usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in inner.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth -= 1,
            ',' if depth == 0 => count += 1,
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    Some(count)
}

/// Derive a readable display name from a profile URL's trailing path
/// segment, e.g. `/user/show/12345-jane-doe` -> `Jane Doe`. Returns None
/// when the segment carries no name part.
pub fn display_name_from_profile_path(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    if !segment.contains('-') {
        return None;
    }
    let words: Vec<String> = segment
        .split('-')
        .skip_while(|w| w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
