use serde::{Deserialize, Serialize};

/// The three library status buckets the pipeline tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shelf {
    Read,
    CurrentlyReading,
    WantToRead,
}

impl Shelf {
    pub const ALL: [Shelf; 3] = [Shelf::Read, Shelf::CurrentlyReading, Shelf::WantToRead];

    /// Slug used by the listing endpoint's `shelf` query parameter.
    pub fn slug(self) -> &'static str {
        match self {
            Shelf::Read => "read",
            Shelf::CurrentlyReading => "currently-reading",
            Shelf::WantToRead => "to-read",
        }
    }

    /// Canonical value stored in the `shelf` column.
    pub fn as_str(self) -> &'static str {
        match self {
            Shelf::Read => "read",
            Shelf::CurrentlyReading => "currently_reading",
            Shelf::WantToRead => "want_to_read",
        }
    }

    /// Inverse of `as_str`.
    pub fn parse(s: &str) -> Option<Shelf> {
        match s {
            "read" => Some(Shelf::Read),
            "currently_reading" => Some(Shelf::CurrentlyReading),
            "want_to_read" => Some(Shelf::WantToRead),
            _ => None,
        }
    }
}

/// Why a scraped row or feed entry was rejected at validation time.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("row has no title")]
    MissingTitle,
    #[error("entry has neither an actor name nor a book title")]
    NoiseEntry,
    #[error("rating {0} is outside the 1-5 scale")]
    RatingOutOfRange(u8),
}

/// One library item as it appears on a listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub title: String,
    pub book_url: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub rating: Option<u8>,
    pub avg_rating: Option<f64>,
    pub num_pages: Option<u32>,
    pub date_published: Option<String>,
    pub date_added: Option<String>,
    pub date_started: Option<String>,
    pub date_read: Option<String>,
    pub review: Option<String>,
    pub shelf: Shelf,
}

/// Field-by-field accumulator for a listing row. Every field is optional
/// until `validate` turns the draft into a `Book`.
#[derive(Debug, Default)]
pub struct BookDraft {
    pub title: Option<String>,
    pub book_url: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub rating: Option<u8>,
    pub avg_rating: Option<f64>,
    pub num_pages: Option<u32>,
    pub date_published: Option<String>,
    pub date_added: Option<String>,
    pub date_started: Option<String>,
    pub date_read: Option<String>,
    pub review: Option<String>,
}

impl BookDraft {
    pub fn validate(self, shelf: Shelf) -> Result<Book, RecordError> {
        let title = self.title.filter(|t| !t.is_empty()).ok_or(RecordError::MissingTitle)?;
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(RecordError::RatingOutOfRange(rating));
            }
        }
        Ok(Book {
            title,
            book_url: self.book_url,
            author: self.author,
            isbn: self.isbn,
            rating: self.rating,
            avg_rating: self.avg_rating,
            num_pages: self.num_pages,
            date_published: self.date_published,
            date_added: self.date_added,
            date_started: self.date_started,
            date_read: self.date_read,
            review: self.review,
            shelf,
        })
    }
}

/// Classified feed event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedAction {
    WantsToRead,
    CurrentlyReading,
    StartedReading,
    Read,
    Rated,
    Reviewed,
    AddedBook,
    Other,
}

impl FeedAction {
    /// Ordered keyword match over a feed header; first match wins. The
    /// order is part of the contract: a header containing several action
    /// phrases resolves to the earliest one in this list.
    pub fn classify(header: &str) -> FeedAction {
        if header.contains("wants to read") {
            FeedAction::WantsToRead
        } else if header.contains("is currently reading") {
            FeedAction::CurrentlyReading
        } else if header.contains("started reading") {
            FeedAction::StartedReading
        } else if header.contains("finished reading") || header.contains("has read") {
            FeedAction::Read
        } else if header.contains("rated") {
            FeedAction::Rated
        } else if header.contains("reviewed") {
            FeedAction::Reviewed
        } else if header.contains("added") {
            FeedAction::AddedBook
        } else {
            FeedAction::Other
        }
    }

    /// Value stored in the `action` column.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedAction::WantsToRead => "wants_to_read",
            FeedAction::CurrentlyReading => "currently_reading",
            FeedAction::StartedReading => "started_reading",
            FeedAction::Read => "read",
            FeedAction::Rated => "rated",
            FeedAction::Reviewed => "reviewed",
            FeedAction::AddedBook => "added_book",
            FeedAction::Other => "other",
        }
    }
}

/// One event scraped from the followed-users activity feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedActivity {
    pub user_name: Option<String>,
    pub user_url: Option<String>,
    pub action: Option<FeedAction>,
    pub header_text: Option<String>,
    pub book_title: Option<String>,
    pub book_url: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub timestamp: Option<String>,
    pub time_ago: Option<String>,
    pub rating: Option<u8>,
    pub book_description: Option<String>,
}

/// Accumulator for a feed entry, validated into a `FeedActivity`.
#[derive(Debug, Default)]
pub struct ActivityDraft {
    pub user_name: Option<String>,
    pub user_url: Option<String>,
    pub action: Option<FeedAction>,
    pub header_text: Option<String>,
    pub book_title: Option<String>,
    pub book_url: Option<String>,
    pub author: Option<String>,
    pub author_url: Option<String>,
    pub timestamp: Option<String>,
    pub time_ago: Option<String>,
    pub rating: Option<u8>,
    pub book_description: Option<String>,
}

impl ActivityDraft {
    pub fn validate(self) -> Result<FeedActivity, RecordError> {
        if self.user_name.is_none() && self.book_title.is_none() {
            return Err(RecordError::NoiseEntry);
        }
        if let Some(rating) = self.rating {
            if !(1..=5).contains(&rating) {
                return Err(RecordError::RatingOutOfRange(rating));
            }
        }
        Ok(FeedActivity {
            user_name: self.user_name,
            user_url: self.user_url,
            action: self.action,
            header_text: self.header_text,
            book_title: self.book_title,
            book_url: self.book_url,
            author: self.author,
            author_url: self.author_url,
            timestamp: self.timestamp,
            time_ago: self.time_ago,
            rating: self.rating,
            book_description: self.book_description,
        })
    }
}

/// Yearly reading challenge progress, one row per (user, year).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingChallenge {
    pub user_id: String,
    pub year: i32,
    pub goal: u32,
    pub books_completed: u32,
    /// Absent when the goal is zero.
    pub percentage: Option<f64>,
    pub books_ahead: Option<f64>,
    pub books_behind: Option<f64>,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_each_action_phrase() {
        let cases = [
            ("Alice wants to read Dune", FeedAction::WantsToRead),
            ("Bob is currently reading Dune", FeedAction::CurrentlyReading),
            ("Carol started reading Dune", FeedAction::StartedReading),
            ("Dave finished reading Dune", FeedAction::Read),
            ("Eve has read Dune", FeedAction::Read),
            ("Frank rated Dune", FeedAction::Rated),
            ("Grace reviewed Dune", FeedAction::Reviewed),
            ("Heidi added Dune to her shelf", FeedAction::AddedBook),
            ("Ivan liked a quote", FeedAction::Other),
        ];
        for (header, expected) in cases {
            assert_eq!(FeedAction::classify(header), expected, "header: {}", header);
        }
    }

    #[test]
    fn classify_is_order_sensitive_for_overlapping_phrases() {
        // Both phrases present: "started reading" is checked before
        // "finished reading", so it must win every time.
        let header = "Alice started reading Dune, which Bob finished reading last week";
        assert_eq!(FeedAction::classify(header), FeedAction::StartedReading);
        assert_eq!(FeedAction::classify(header), FeedAction::StartedReading);
    }

    #[test]
    fn book_draft_requires_title() {
        let draft = BookDraft {
            author: Some("Frank Herbert".to_string()),
            ..Default::default()
        };
        assert!(matches!(draft.validate(Shelf::Read), Err(RecordError::MissingTitle)));
    }

    #[test]
    fn book_draft_rejects_out_of_range_rating() {
        let draft = BookDraft {
            title: Some("Dune".to_string()),
            rating: Some(6),
            ..Default::default()
        };
        assert!(matches!(
            draft.validate(Shelf::Read),
            Err(RecordError::RatingOutOfRange(6))
        ));
    }

    #[test]
    fn activity_draft_rejects_noise_entries() {
        let draft = ActivityDraft {
            time_ago: Some("2 days ago".to_string()),
            ..Default::default()
        };
        assert!(matches!(draft.validate(), Err(RecordError::NoiseEntry)));
    }

    #[test]
    fn activity_draft_accepts_book_only_entries() {
        let draft = ActivityDraft {
            book_title: Some("Dune".to_string()),
            ..Default::default()
        };
        assert!(draft.validate().is_ok());
    }
}
