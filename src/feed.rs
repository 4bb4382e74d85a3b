use crate::helpers::{display_name_from_profile_path, element_text, non_empty, select_first, truncate_chars};
use crate::models::{ActivityDraft, FeedAction, FeedActivity};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Container the renderer waits for before reading the page.
pub const FEED_ITEM_SELECTOR: &str = "div.gr-newsfeedItem";

/// Link labels the site sometimes renders instead of the username.
const ACTION_PHRASES: [&str; 8] = [
    "wants to read",
    "is currently reading",
    "started reading",
    "finished reading",
    "has read",
    "rated",
    "reviewed",
    "added",
];

/// Parse rendered feed markup into classified activity records. At most
/// `max_items` of the newest entries are considered; per-entry failures
/// skip that entry and never abort the batch.
pub fn extract_feed(html: &str, base_url: &str, max_items: usize) -> Vec<FeedActivity> {
    let document = Html::parse_document(html);
    let item_sel = Selector::parse(FEED_ITEM_SELECTOR).unwrap();
    let items: Vec<ElementRef> = document.select(&item_sel).collect();
    if items.is_empty() {
        info!("No feed items found in the rendered HTML");
        return Vec::new();
    }

    let mut activities = Vec::new();
    for item in items.into_iter().take(max_items) {
        let draft = extract_feed_item(item, base_url);
        if draft.user_name.is_none() && draft.book_title.is_none() {
            debug!("Dropping feed entry with neither actor nor book");
            continue;
        }
        match draft.validate() {
            Ok(activity) => activities.push(activity),
            Err(e) => warn!("Skipping feed item, failed validation: {}", e),
        }
    }

    info!("Found {} activities in feed", activities.len());
    activities
}

fn extract_feed_item(item: ElementRef, base_url: &str) -> ActivityDraft {
    let mut draft = ActivityDraft::default();

    // Actor. The profile link label is usually the username, but the site
    // sometimes puts the action phrase there instead; the profile URL slug
    // is the fallback identity in that case.
    if let Some(link) = select_first(item, "a.gr-user__profileLink") {
        let text = element_text(link);
        let href = link.value().attr("href").unwrap_or("").to_string();
        if ACTION_PHRASES.contains(&text.to_lowercase().as_str()) {
            draft.user_name = Some(
                display_name_from_profile_path(&href).unwrap_or_else(|| "Unknown".to_string()),
            );
        } else if !text.is_empty() {
            draft.user_name = Some(text);
        }
        if !href.is_empty() {
            draft.user_url = Some(href);
        }
    }

    if let Some(header) = select_first(item, "div.gr-newsfeedItem__header") {
        let header_text = element_text(header);
        let action = FeedAction::classify(&header_text);
        if action == FeedAction::Rated {
            draft.rating = star_bar_rating(item);
        }
        draft.action = Some(action);
        draft.header_text = Some(truncate_chars(&header_text, 200));
    }

    if let Some(link) = select_first(item, "a.gr-book__titleLink") {
        draft.book_title = non_empty(element_text(link));
        draft.book_url = link.value().attr("href").map(|h| absolutize(base_url, h));
    }

    if let Some(link) = select_first(item, "a.gr-book__authorLink") {
        draft.author = non_empty(element_text(link));
        draft.author_url = link.value().attr("href").map(|h| absolutize(base_url, h));
    }

    if let Some(stamp) = select_first(item, "small.gr-newsfeedItem__headerTimestamp") {
        if let Some(time_tag) = select_first(stamp, "time") {
            if let Some(datetime) = time_tag.value().attr("datetime") {
                draft.timestamp = Some(datetime.to_string());
                draft.time_ago = non_empty(element_text(time_tag));
            }
        }
        if draft.timestamp.is_none() {
            if let Some(datetime) = stamp.value().attr("datetime") {
                draft.timestamp = Some(datetime.to_string());
            }
            draft.time_ago = non_empty(element_text(stamp));
        }
    }

    if let Some(desc) = select_first(item, "div.gr-book__description") {
        let text = element_text(desc);
        let text = Regex::new(r"Continue reading$")
            .unwrap()
            .replace(&text, "")
            .trim()
            .to_string();
        if !text.is_empty() {
            draft.book_description = Some(truncate_chars(&text, 500));
        }
    }

    draft
}

/// The community rating renders as a star bar whose width encodes the
/// score at 20% per star; `round(width / 20)` recovers the 1-5 value.
fn star_bar_rating(item: ElementRef) -> Option<u8> {
    let stars = select_first(item, "div.communityRating__stars")?;
    let style = stars.value().attr("style")?;
    let caps = Regex::new(r"width:\s*(\d+)%").unwrap().captures(style)?;
    let width: f64 = caps[1].parse().ok()?;
    let rating = (width / 20.0).round() as u8;
    if rating == 0 {
        None
    } else {
        Some(rating)
    }
}

fn absolutize(base_url: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url, href)
    }
}
