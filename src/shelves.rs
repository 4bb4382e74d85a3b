use crate::config::ScrapeConfig;
use crate::helpers::{element_text, non_empty, normalize_date, select_first, truncate_chars};
use crate::models::{Book, BookDraft, Shelf};
use crate::session::Session;
use log::{debug, info, warn};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

/// Everything harvested from the three shelves in one run.
#[derive(Debug, Default, Serialize)]
pub struct Library {
    pub read: Vec<Book>,
    pub currently_reading: Vec<Book>,
    pub want_to_read: Vec<Book>,
}

impl Library {
    pub fn all(&self) -> impl Iterator<Item = &Book> {
        self.read
            .iter()
            .chain(self.currently_reading.iter())
            .chain(self.want_to_read.iter())
    }

    pub fn total(&self) -> usize {
        self.read.len() + self.currently_reading.len() + self.want_to_read.len()
    }

    /// Zero items across all three shelves. Callers treat this as the
    /// degraded-run signal: the listing markup has likely drifted.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    fn shelf_mut(&mut self, shelf: Shelf) -> &mut Vec<Book> {
        match shelf {
            Shelf::Read => &mut self.read,
            Shelf::CurrentlyReading => &mut self.currently_reading,
            Shelf::WantToRead => &mut self.want_to_read,
        }
    }
}

/// One parsed listing page.
#[derive(Debug)]
pub struct ShelfPage {
    pub books: Vec<Book>,
    /// Raw row count before title filtering and validation; pagination
    /// decisions key off this, not off how many rows survived.
    pub rows_seen: usize,
    pub next_disabled: bool,
}

/// Why a shelf loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No rows on the very first page.
    EmptyShelf,
    /// Two consecutive empty pages past the first.
    TrailingEmptyPages,
    /// The next-page control is present but disabled.
    EndOfListing,
    /// Hard page cap hit; almost certainly markup drift.
    PageCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStep {
    Continue,
    Stop(StopReason),
}

/// Per-shelf pagination state. The termination policy lives here so it
/// can be exercised without any HTTP in the loop.
#[derive(Debug)]
pub struct Pagination {
    page: u32,
    empty_streak: u32,
    max_pages: u32,
}

impl Pagination {
    pub fn new(max_pages: u32) -> Self {
        Self { page: 1, empty_streak: 0, max_pages }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    /// Decide whether to fetch another page after seeing the current
    /// page's contents. A single empty page mid-listing is tolerated (the
    /// site occasionally serves one during a render race); two in a row
    /// end the shelf.
    pub fn advance(&mut self, rows_seen: usize, next_disabled: bool) -> PageStep {
        if rows_seen == 0 {
            if self.page == 1 {
                return PageStep::Stop(StopReason::EmptyShelf);
            }
            self.empty_streak += 1;
            if self.empty_streak >= 2 {
                return PageStep::Stop(StopReason::TrailingEmptyPages);
            }
        } else {
            self.empty_streak = 0;
        }
        if next_disabled {
            return PageStep::Stop(StopReason::EndOfListing);
        }
        if self.page >= self.max_pages {
            return PageStep::Stop(StopReason::PageCap);
        }
        self.page += 1;
        PageStep::Continue
    }
}

/// Drives the listing endpoint across the three shelves, strictly
/// sequentially.
pub struct ShelfScraper<'a> {
    session: &'a Session,
    config: &'a ScrapeConfig,
}

impl<'a> ShelfScraper<'a> {
    pub fn new(session: &'a Session, config: &'a ScrapeConfig) -> Self {
        Self { session, config }
    }

    /// Scrape every shelf. Failures are contained per shelf: a broken
    /// shelf yields whatever was collected before the break and the next
    /// shelf still runs.
    pub async fn scrape_all(&self) -> Library {
        let mut library = Library::default();
        for shelf in Shelf::ALL {
            let books = self.scrape_shelf(shelf).await;
            info!("Total found: {} books in {} shelf", books.len(), shelf.slug());
            *library.shelf_mut(shelf) = books;
        }
        library
    }

    async fn scrape_shelf(&self, shelf: Shelf) -> Vec<Book> {
        info!("Scraping {} shelf...", shelf.slug());
        let mut books = Vec::new();
        let mut pagination = Pagination::new(self.config.max_pages);

        loop {
            let url = format!(
                "{}/review/list/{}?shelf={}&page={}&per_page={}",
                self.session.base_url(),
                self.session.user_id(),
                shelf.slug(),
                pagination.page(),
                self.config.per_page
            );

            let response = match self.session.get(&url).await {
                Ok(response) => response,
                Err(e) => {
                    warn!("Request failed for {} page {}: {}", shelf.slug(), pagination.page(), e);
                    break;
                }
            };
            if response.status() != StatusCode::OK {
                warn!(
                    "Got status code {} for {} page {}",
                    response.status(),
                    shelf.slug(),
                    pagination.page()
                );
                break;
            }
            let html = match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Failed to read {} page {}: {}", shelf.slug(), pagination.page(), e);
                    break;
                }
            };

            let page = parse_shelf_page(&html, shelf, self.session.base_url());
            if !page.books.is_empty() {
                debug!("Page {}: found {} books", pagination.page(), page.books.len());
            }
            books.extend(page.books);

            match pagination.advance(page.rows_seen, page.next_disabled) {
                PageStep::Stop(StopReason::EmptyShelf) => {
                    info!("No books found in {} shelf", shelf.slug());
                    break;
                }
                PageStep::Stop(StopReason::PageCap) => {
                    warn!("Reached page limit ({}) for {} shelf", self.config.max_pages, shelf.slug());
                    break;
                }
                PageStep::Stop(_) => break,
                PageStep::Continue => {
                    sleep(Duration::from_millis(self.config.page_delay_ms)).await;
                }
            }
        }

        books
    }
}

/// Parse one listing page into validated books plus the signals the
/// pagination policy needs.
pub fn parse_shelf_page(html: &str, shelf: Shelf, base_url: &str) -> ShelfPage {
    let document = Html::parse_document(html);

    let mut rows: Vec<ElementRef> = document
        .select(&Selector::parse("tr.bookalike.review").unwrap())
        .collect();
    if rows.is_empty() {
        rows = document
            .select(&Selector::parse(r#"tr[id^="review_"]"#).unwrap())
            .collect();
    }

    let rows_seen = rows.len();
    let mut books = Vec::new();
    for row in rows {
        let draft = extract_row(row, shelf, base_url);
        if draft.title.is_none() {
            debug!("Dropping row without a title on {} shelf", shelf.slug());
            continue;
        }
        match draft.validate(shelf) {
            Ok(book) => books.push(book),
            Err(e) => warn!("Skipping book, failed validation: {}", e),
        }
    }

    let next_disabled = document
        .select(&Selector::parse("a.next_page").unwrap())
        .next()
        .map(|a| a.value().classes().any(|c| c == "disabled"))
        .unwrap_or(false);

    ShelfPage { books, rows_seen, next_disabled }
}

/// Decompose one row into candidate fields. Every lookup is independent
/// and best-effort: a missing or malformed field stays absent without
/// touching its neighbours.
pub fn extract_row(row: ElementRef, shelf: Shelf, base_url: &str) -> BookDraft {
    let mut draft = BookDraft::default();

    if let Some(cell) = select_first(row, "td.field.title") {
        let link = select_first(cell, "a.bookTitle").or_else(|| select_first(cell, "a"));
        if let Some(link) = link {
            draft.title = non_empty(element_text(link));
            if let Some(href) = link.value().attr("href") {
                draft.book_url = Some(format!("{}{}", base_url, href));
            }
        }
    }

    if let Some(link) = select_first(row, "td.field.author a") {
        draft.author = non_empty(element_text(link));
    }

    if let Some(value) = select_first(row, "td.field.isbn13 div.value") {
        let text = element_text(value);
        if !text.is_empty() && text != "—" {
            draft.isbn = Some(text);
        }
    }

    if let Some(stars) = select_first(row, "td.field.rating div.stars") {
        if let Some(raw) = stars.value().attr("data-rating") {
            if let Ok(rating) = raw.trim().parse::<u8>() {
                if rating > 0 {
                    draft.rating = Some(rating);
                }
            }
        }
    }

    if let Some(value) = select_first(row, "td.field.avg_rating div.value") {
        if let Ok(avg) = element_text(value).parse::<f64>() {
            draft.avg_rating = Some(avg);
        }
    }

    // Page count sits in a <nobr> whose first text node is the number;
    // the rest is the "pages" label.
    if let Some(value) = select_first(row, "td.field.num_pages div.value") {
        if let Some(nobr) = select_first(value, "nobr") {
            if let Some(first) = nobr.text().next() {
                if let Ok(pages) = first.trim().replace(',', "").parse::<u32>() {
                    draft.num_pages = Some(pages);
                }
            }
        }
    }

    if let Some(value) = select_first(row, "td.field.date_pub div.value") {
        draft.date_published = non_empty(element_text(value));
    }

    if let Some(cell) = select_first(row, "td.field.date_added") {
        draft.date_added = date_cell_text(cell, "date_added_value").and_then(|t| normalize_date(&t));
    }

    if shelf == Shelf::CurrentlyReading {
        if let Some(cell) = select_first(row, "td.field.date_started") {
            draft.date_started =
                date_cell_text(cell, "date_started_value").and_then(|t| normalize_date(&t));
        }
    }

    if shelf == Shelf::Read {
        if let Some(cell) = select_first(row, "td.field.date_read") {
            draft.date_read = date_read_text(cell).and_then(|t| normalize_date(&t));
        }
    }

    if let Some(cell) = select_first(row, "td.field.review") {
        draft.review = review_text(cell);
    }

    draft
}

/// Date cells hide the full date in a span's `title` attribute; the span
/// text and the raw cell text are progressively weaker fallbacks.
fn date_cell_text(cell: ElementRef, value_class: &str) -> Option<String> {
    if let Some(span) = select_first(cell, "span[title]") {
        if let Some(title) = span.value().attr("title") {
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    if let Some(span) = select_first(cell, &format!("span.{}", value_class)) {
        let text = element_text(span);
        if !text.is_empty() {
            return Some(text);
        }
    }
    non_empty(element_text(cell))
}

fn date_read_text(cell: ElementRef) -> Option<String> {
    let span = select_first(cell, "span.date_read_value").or_else(|| select_first(cell, "span"));
    if let Some(span) = span {
        if let Some(title) = span.value().attr("title") {
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
        return non_empty(element_text(span));
    }
    non_empty(element_text(cell))
}

/// The review excerpt lives in a span with an id of the form
/// `freeText<digits>`; `freeTextContainer...` spans hold the collapsed
/// preview and are skipped.
fn review_text(cell: ElementRef) -> Option<String> {
    let span_sel = Selector::parse(r#"span[id^="freeText"]"#).unwrap();
    for span in cell.select(&span_sel) {
        let id = span.value().attr("id").unwrap_or("");
        let Some(rest) = id.strip_prefix("freeText") else {
            continue;
        };
        if !rest.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            continue;
        }
        let text = element_text(span);
        if !text.is_empty() {
            return Some(truncate_chars(&text, 500));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(pages: &[usize], max_pages: u32) -> (u32, StopReason) {
        let mut pagination = Pagination::new(max_pages);
        for &rows in pages {
            let fetched = pagination.page();
            match pagination.advance(rows, false) {
                PageStep::Stop(reason) => return (fetched, reason),
                PageStep::Continue => {}
            }
        }
        panic!("pagination never stopped");
    }

    #[test]
    fn empty_first_page_ends_the_shelf() {
        assert_eq!(drive(&[0], 100), (1, StopReason::EmptyShelf));
    }

    #[test]
    fn stops_after_exactly_two_trailing_empty_pages() {
        // 3 pages of content, then empties: pages 4 and 5 are fetched,
        // not fewer, not more.
        let pages = [30, 30, 30, 0, 0, 0, 0];
        assert_eq!(drive(&pages, 100), (5, StopReason::TrailingEmptyPages));
    }

    #[test]
    fn single_empty_page_mid_listing_is_tolerated() {
        let pages = [30, 0, 30, 0, 0];
        assert_eq!(drive(&pages, 100), (5, StopReason::TrailingEmptyPages));
    }

    #[test]
    fn disabled_next_control_ends_the_shelf() {
        let mut pagination = Pagination::new(100);
        assert_eq!(pagination.advance(30, false), PageStep::Continue);
        assert_eq!(pagination.advance(30, true), PageStep::Stop(StopReason::EndOfListing));
    }

    #[test]
    fn page_cap_stops_runaway_listings() {
        let mut pagination = Pagination::new(100);
        for _ in 0..99 {
            assert_eq!(pagination.advance(30, false), PageStep::Continue);
        }
        assert_eq!(pagination.page(), 100);
        assert_eq!(pagination.advance(30, false), PageStep::Stop(StopReason::PageCap));
    }
}
