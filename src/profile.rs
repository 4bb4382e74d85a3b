use crate::helpers::{element_text, non_empty, select_first};
use crate::session::Session;
use log::{error, info, warn};
use regex::Regex;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use serde::Serialize;
use std::collections::BTreeMap;

/// Account-level facts scraped from the profile page. Everything is
/// best-effort; absent fields stay absent.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ProfileMetadata {
    pub username: Option<String>,
    pub total_books: Option<u32>,
    pub friends_count: Option<u32>,
    pub following_count: Option<u32>,
    pub followers_count: Option<u32>,
    pub books_read_this_year: Option<u32>,
    pub yearly_reading_goal: Option<u32>,
    pub member_since: Option<String>,
    pub shelf_counts: BTreeMap<String, u32>,
}

/// Fetch and parse the profile page. Failure yields an empty metadata
/// value; the rest of the run is unaffected.
pub async fn fetch(session: &Session) -> ProfileMetadata {
    info!("Fetching account metadata...");
    let url = format!("{}/user/show/{}", session.base_url(), session.user_id());

    let response = match session.get(&url).await {
        Ok(response) => response,
        Err(e) => {
            error!("Error getting account metadata: {}", e);
            return ProfileMetadata::default();
        }
    };
    if response.status() != StatusCode::OK {
        warn!("Profile page returned status {}", response.status());
        return ProfileMetadata::default();
    }
    match response.text().await {
        Ok(html) => parse_profile_page(&html),
        Err(e) => {
            error!("Error reading profile page: {}", e);
            ProfileMetadata::default()
        }
    }
}

pub fn parse_profile_page(html: &str) -> ProfileMetadata {
    let document = Html::parse_document(html);
    let root = document.root_element();
    let mut meta = ProfileMetadata::default();

    let heading = select_first(root, "h1.userProfileName").or_else(|| select_first(root, "h1"));
    if let Some(h1) = heading {
        meta.username = non_empty(element_text(h1));
    }

    let books_re = Regex::new(r"(?i)(\d+)\s+books?\b").unwrap();
    let friends_re = Regex::new(r"(?i)(\d+)\s+friends?\b").unwrap();
    let following_re = Regex::new(r"(?i)(\d+)\s+following\b").unwrap();
    let followers_re = Regex::new(r"(?i)(\d+)\s+followers?\b").unwrap();
    for div in document.select(&Selector::parse("div.leftContainer").unwrap()) {
        let text = element_text(div);
        if let Some(count) = first_capture_u32(&books_re, &text) {
            meta.total_books = Some(count);
        }
        if let Some(count) = first_capture_u32(&friends_re, &text) {
            meta.friends_count = Some(count);
        }
        if let Some(count) = first_capture_u32(&following_re, &text) {
            meta.following_count = Some(count);
        }
        if let Some(count) = first_capture_u32(&followers_re, &text) {
            meta.followers_count = Some(count);
        }
    }

    // "N of M books" teaser from the yearly challenge widget
    if let Some(widget) = select_first(root, "div.challengePic") {
        let text = element_text(widget);
        if let Some(caps) = Regex::new(r"(\d+)\s+of\s+(\d+)").unwrap().captures(&text) {
            meta.books_read_this_year = caps[1].parse().ok();
            meta.yearly_reading_goal = caps[2].parse().ok();
        }
    }

    let member_re = Regex::new(r"(?i)member since").unwrap();
    for div in document.select(&Selector::parse("div.infoBoxRowItem").unwrap()) {
        let text = element_text(div);
        if member_re.is_match(&text) {
            meta.member_since = non_empty(member_re.replace(&text, "").trim().to_string());
        }
    }

    if let Some(section) = select_first(root, "div#shelvesSection") {
        let link_sel = Selector::parse(r#"a[href*="/review/list/"]"#).unwrap();
        let count_re = Regex::new(r"\((\d+)\)").unwrap();
        for link in section.select(&link_sel) {
            let text = element_text(link);
            if let Some(caps) = count_re.captures(&text) {
                let name = text
                    .split('(')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .replace([' ', '-'], "_");
                if !name.is_empty() {
                    meta.shelf_counts.insert(name, caps[1].parse().unwrap_or(0));
                }
            }
        }
    }

    meta
}

fn first_capture_u32(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text).and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE_HTML: &str = r#"
        <html><body>
            <h1 class="userProfileName"> Jane Doe </h1>
            <div class="leftContainer">
                412 books | 37 friends
                <span>12 following</span>
                <span>58 followers</span>
            </div>
            <div class="challengePic">She has read 14 of 52 books this year</div>
            <div class="infoBoxRowItem">Member Since March 2015</div>
            <div id="shelvesSection">
                <a href="/review/list/42?shelf=read">read (301)</a>
                <a href="/review/list/42?shelf=to-read">to-read (98)</a>
                <a href="/review/list/42?shelf=sci-fi">sci fi (17)</a>
            </div>
        </body></html>
    "#;

    #[test]
    fn parses_all_profile_fields() {
        let meta = parse_profile_page(PROFILE_HTML);
        assert_eq!(meta.username.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.total_books, Some(412));
        assert_eq!(meta.friends_count, Some(37));
        assert_eq!(meta.following_count, Some(12));
        assert_eq!(meta.followers_count, Some(58));
        assert_eq!(meta.books_read_this_year, Some(14));
        assert_eq!(meta.yearly_reading_goal, Some(52));
        assert_eq!(meta.member_since.as_deref(), Some("March 2015"));
        assert_eq!(meta.shelf_counts.get("read"), Some(&301));
        assert_eq!(meta.shelf_counts.get("to_read"), Some(&98));
        assert_eq!(meta.shelf_counts.get("sci_fi"), Some(&17));
    }

    #[test]
    fn missing_sections_stay_absent() {
        let meta = parse_profile_page("<html><body><p>nothing here</p></body></html>");
        assert_eq!(meta.username, None);
        assert_eq!(meta.total_books, None);
        assert!(meta.shelf_counts.is_empty());
    }
}
