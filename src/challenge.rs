use crate::helpers::{literal_list_len, round1, round2};
use crate::models::ReadingChallenge;
use crate::session::Session;
use chrono::{DateTime, Datelike, Utc};
use log::{error, info, warn};
use reqwest::StatusCode;

const DAYS_IN_YEAR: f64 = 365.0;

/// Fetch reading-challenge progress from the goals endpoint. Challenge
/// data is optional: every failure path degrades to `None` and the rest
/// of the run is unaffected.
pub async fn fetch(session: &Session) -> Option<ReadingChallenge> {
    info!("Fetching reading challenge details...");
    let url = format!("{}/readingchallenges/goals/data", session.base_url());

    let response = match session.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            error!("Error getting reading challenge: {}", e);
            return None;
        }
    };
    if response.status() != StatusCode::OK {
        warn!(
            "Reading challenge API request failed with status {}",
            response.status()
        );
        return None;
    }
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            error!("Error reading challenge response: {}", e);
            return None;
        }
    };

    let challenge = parse_challenge(&body, session.user_id(), Utc::now());
    if challenge.is_none() {
        error!(
            "Failed to parse challenge response: {}",
            body.chars().take(500).collect::<String>()
        );
    }
    challenge
}

/// Decode the challenge payload. `booksRead` arrives as a string-embedded
/// literal list, so its length is counted rather than JSON-decoded.
pub fn parse_challenge(body: &str, user_id: &str, now: DateTime<Utc>) -> Option<ReadingChallenge> {
    let data: serde_json::Value = serde_json::from_str(body).ok()?;
    let goal = data.get("readingGoal").and_then(json_u32)?;
    let books_completed = data
        .get("booksRead")
        .and_then(|v| v.as_str())
        .and_then(literal_list_len)
        .unwrap_or(0) as u32;

    let mut challenge = ReadingChallenge {
        user_id: user_id.to_string(),
        year: now.year(),
        goal,
        books_completed,
        percentage: None,
        books_ahead: None,
        books_behind: None,
        updated_at: now.to_rfc3339(),
    };

    if goal > 0 {
        challenge.percentage = Some(round2(books_completed as f64 / goal as f64 * 100.0));
        let (ahead, behind) = derive_pace(books_completed, goal, now.ordinal());
        challenge.books_ahead = ahead;
        challenge.books_behind = behind;
    }

    Some(challenge)
}

/// Expected progress is linear over a fixed 365-day year; the signed
/// difference against it becomes either an ahead or a behind magnitude,
/// never both, never negative.
pub fn derive_pace(completed: u32, goal: u32, day_of_year: u32) -> (Option<f64>, Option<f64>) {
    let expected = day_of_year as f64 / DAYS_IN_YEAR * goal as f64;
    let difference = completed as f64 - expected;
    if difference > 0.0 {
        (Some(round1(difference)), None)
    } else {
        (None, Some(round1(difference.abs())))
    }
}

fn json_u32(value: &serde_json::Value) -> Option<u32> {
    value
        .as_u64()
        .map(|n| n as u32)
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}
