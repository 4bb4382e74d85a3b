use crate::helpers::{parse_bucket_date, round1, round2};
use crate::models::{Book, Shelf};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregates derived from one run's harvested library. Ephemeral:
/// recomputed per scrape, never persisted.
#[derive(Debug, Default, Serialize)]
pub struct Statistics {
    /// Finished books bucketed by `YYYY-MM` of the finish date.
    pub books_read_per_month: BTreeMap<String, u32>,
    pub books_read_per_year: BTreeMap<i32, u32>,
    /// Additions to any shelf bucketed by `YYYY-MM` of the add date.
    pub books_added_per_month: BTreeMap<String, u32>,
    pub books_added_per_year: BTreeMap<i32, u32>,
    /// Additions bucketed per shelf, then per month / year.
    pub shelf_additions_per_month: BTreeMap<String, BTreeMap<String, u32>>,
    pub shelf_additions_per_year: BTreeMap<String, BTreeMap<i32, u32>>,
    pub overall: OverallStats,
    pub reading_speed: ReadingSpeed,
}

#[derive(Debug, Default, Serialize)]
pub struct OverallStats {
    pub total_books: usize,
    pub read: usize,
    pub currently_reading: usize,
    pub want_to_read: usize,
    pub average_rating: Option<f64>,
    pub total_pages_read: u64,
    pub average_pages_per_book: Option<f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct ReadingSpeed {
    pub avg_days_to_read: Option<f64>,
    pub median_days_to_read: Option<f64>,
}

/// Pure aggregation over the in-memory book set for the current run.
/// An empty input produces all-empty aggregates; degenerate subsets
/// (no ratings, no page counts, no usable date pairs) leave their
/// averages absent rather than erroring.
pub fn calculate<'a>(books: impl IntoIterator<Item = &'a Book>) -> Statistics {
    let mut stats = Statistics::default();
    let mut rating_sum = 0.0;
    let mut rating_count = 0u32;
    let mut pages_sum = 0.0;
    let mut pages_count = 0u32;
    let mut days_to_read: Vec<i64> = Vec::new();

    for book in books {
        stats.overall.total_books += 1;
        match book.shelf {
            Shelf::Read => stats.overall.read += 1,
            Shelf::CurrentlyReading => stats.overall.currently_reading += 1,
            Shelf::WantToRead => stats.overall.want_to_read += 1,
        }

        let added = book.date_added.as_deref().and_then(parse_bucket_date);
        let finished = book.date_read.as_deref().and_then(parse_bucket_date);

        if book.shelf == Shelf::Read {
            if let Some(date) = finished {
                *stats.books_read_per_month.entry(month_key(date)).or_insert(0) += 1;
                *stats.books_read_per_year.entry(date.year()).or_insert(0) += 1;
            }
            if let (Some(finish), Some(add)) = (finished, added) {
                let days = (finish - add).num_days();
                if days >= 0 {
                    days_to_read.push(days);
                }
            }
        }

        if let Some(date) = added {
            *stats.books_added_per_month.entry(month_key(date)).or_insert(0) += 1;
            *stats.books_added_per_year.entry(date.year()).or_insert(0) += 1;

            let shelf = book.shelf.as_str().to_string();
            *stats
                .shelf_additions_per_month
                .entry(shelf.clone())
                .or_default()
                .entry(month_key(date))
                .or_insert(0) += 1;
            *stats
                .shelf_additions_per_year
                .entry(shelf)
                .or_default()
                .entry(date.year())
                .or_insert(0) += 1;
        }

        if let Some(rating) = book.rating {
            rating_sum += f64::from(rating);
            rating_count += 1;
        }
        if let Some(pages) = book.num_pages {
            pages_sum += f64::from(pages);
            pages_count += 1;
            if book.shelf == Shelf::Read {
                stats.overall.total_pages_read += u64::from(pages);
            }
        }
    }

    if rating_count > 0 {
        stats.overall.average_rating = Some(round2(rating_sum / f64::from(rating_count)));
    }
    if pages_count > 0 {
        stats.overall.average_pages_per_book = Some(round1(pages_sum / f64::from(pages_count)));
    }
    if !days_to_read.is_empty() {
        let sum: i64 = days_to_read.iter().sum();
        stats.reading_speed.avg_days_to_read =
            Some(round1(sum as f64 / days_to_read.len() as f64));
        days_to_read.sort_unstable();
        stats.reading_speed.median_days_to_read = Some(round1(median(&days_to_read)));
    }

    stats
}

fn month_key(date: chrono::NaiveDate) -> String {
    format!("{}-{:02}", date.year(), date.month())
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[i64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, shelf: Shelf) -> Book {
        Book {
            title: title.to_string(),
            book_url: None,
            author: None,
            isbn: None,
            rating: None,
            avg_rating: None,
            num_pages: None,
            date_published: None,
            date_added: None,
            date_started: None,
            date_read: None,
            review: None,
            shelf,
        }
    }

    #[test]
    fn empty_library_yields_empty_aggregates() {
        let stats = calculate(std::iter::empty());
        assert_eq!(stats.overall.total_books, 0);
        assert!(stats.books_read_per_month.is_empty());
        assert!(stats.shelf_additions_per_year.is_empty());
        assert_eq!(stats.overall.average_rating, None);
        assert_eq!(stats.reading_speed.avg_days_to_read, None);
        assert_eq!(stats.reading_speed.median_days_to_read, None);
    }

    #[test]
    fn mean_days_to_finish_averages_the_two_deltas() {
        let mut first = book("A", Shelf::Read);
        first.date_added = Some("2023-01-01".to_string());
        first.date_read = Some("2023-01-11".to_string()); // 10 days

        let mut second = book("B", Shelf::Read);
        second.date_added = Some("2023-02-01".to_string());
        second.date_read = Some("2023-02-21".to_string()); // 20 days

        let books = [first, second];
        let stats = calculate(books.iter());
        assert_eq!(stats.reading_speed.avg_days_to_read, Some(15.0));
        assert_eq!(stats.reading_speed.median_days_to_read, Some(15.0));
    }

    #[test]
    fn negative_reading_spans_are_discarded() {
        let mut backwards = book("A", Shelf::Read);
        backwards.date_added = Some("2023-05-01".to_string());
        backwards.date_read = Some("2023-01-01".to_string());

        let books = [backwards];
        let stats = calculate(books.iter());
        assert_eq!(stats.reading_speed.avg_days_to_read, None);
    }

    #[test]
    fn buckets_by_month_year_and_shelf() {
        let mut finished = book("A", Shelf::Read);
        finished.date_added = Some("2022-12".to_string()); // coerced to Dec 1st
        finished.date_read = Some("2023-01-05".to_string());
        finished.rating = Some(4);
        finished.num_pages = Some(300);

        let mut queued = book("B", Shelf::WantToRead);
        queued.date_added = Some("2023-01-20".to_string());
        queued.num_pages = Some(100);

        let books = [finished, queued];
        let stats = calculate(books.iter());

        assert_eq!(stats.books_read_per_month.get("2023-01"), Some(&1));
        assert_eq!(stats.books_read_per_year.get(&2023), Some(&1));
        assert_eq!(stats.books_added_per_year.get(&2022), Some(&1));
        assert_eq!(stats.books_added_per_year.get(&2023), Some(&1));
        assert_eq!(
            stats.shelf_additions_per_month.get("want_to_read").and_then(|m| m.get("2023-01")),
            Some(&1)
        );
        assert_eq!(stats.overall.average_rating, Some(4.0));
        assert_eq!(stats.overall.total_pages_read, 300);
        assert_eq!(stats.overall.average_pages_per_book, Some(200.0));
        // 2022-12-01 -> 2023-01-05 is 35 days
        assert_eq!(stats.reading_speed.avg_days_to_read, Some(35.0));
    }

    #[test]
    fn year_only_dates_bucket_into_january() {
        let mut vintage = book("A", Shelf::Read);
        vintage.date_added = Some("2019".to_string());

        let books = [vintage];
        let stats = calculate(books.iter());
        assert_eq!(stats.books_added_per_month.get("2019-01"), Some(&1));
        assert_eq!(stats.books_added_per_year.get(&2019), Some(&1));
    }
}
