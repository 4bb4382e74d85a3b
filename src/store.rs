use crate::config::Environment;
use crate::models::{Book, FeedActivity, ReadingChallenge, Shelf};
use chrono::{DateTime, FixedOffset};
use log::info;
use rusqlite::{params, Connection};

/// SQLite-backed persistence gateway. One `Store` is constructed at
/// process start and passed by reference to every operation; table names
/// are environment-qualified so dev runs never touch production data.
pub struct Store {
    conn: Connection,
    books_table: String,
    feed_table: String,
    challenge_table: String,
    metadata_table: String,
}

impl Store {
    pub fn open(path: &str, environment: Environment) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open(path)?, environment)
    }

    pub fn open_in_memory(environment: Environment) -> rusqlite::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, environment)
    }

    fn from_connection(conn: Connection, environment: Environment) -> rusqlite::Result<Self> {
        let store = Self {
            conn,
            books_table: environment.qualify("books"),
            feed_table: environment.qualify("feed"),
            challenge_table: environment.qualify("reading_challenges"),
            metadata_table: environment.qualify("metadata"),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> rusqlite::Result<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    book_url TEXT,
                    author TEXT,
                    isbn TEXT,
                    rating INTEGER,
                    avg_rating REAL,
                    num_pages INTEGER,
                    date_published TEXT,
                    date_added TEXT,
                    date_started TEXT,
                    date_read TEXT,
                    review TEXT,
                    shelf TEXT NOT NULL,
                    UNIQUE(user_id, book_url)
                )",
                self.books_table
            ),
            [],
        )?;

        // Feed rows have no upstream identifier; the unique index over the
        // content fields is what makes duplicate inserts detectable.
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_name TEXT,
                    user_url TEXT,
                    action TEXT,
                    header_text TEXT,
                    book_title TEXT,
                    book_url TEXT,
                    author TEXT,
                    author_url TEXT,
                    timestamp TEXT,
                    time_ago TEXT,
                    rating INTEGER,
                    book_description TEXT,
                    UNIQUE(user_name, action, book_url, timestamp)
                )",
                self.feed_table
            ),
            [],
        )?;

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    year INTEGER NOT NULL,
                    goal INTEGER NOT NULL,
                    books_completed INTEGER NOT NULL,
                    percentage REAL,
                    books_ahead REAL,
                    books_behind REAL,
                    updated_at TEXT,
                    UNIQUE(user_id, year)
                )",
                self.challenge_table
            ),
            [],
        )?;

        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                )",
                self.metadata_table
            ),
            [],
        )?;

        Ok(())
    }

    /// Idempotent upsert keyed on (user_id, book_url); a re-scraped book
    /// updates its existing row in place.
    pub fn upsert_books<'a, I>(&mut self, user_id: &str, books: I) -> rusqlite::Result<usize>
    where
        I: IntoIterator<Item = &'a Book>,
    {
        let tx = self.conn.transaction()?;
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (user_id, title, book_url, author, isbn, rating, avg_rating,
                                 num_pages, date_published, date_added, date_started, date_read,
                                 review, shelf)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                 ON CONFLICT(user_id, book_url) DO UPDATE SET
                    title = excluded.title,
                    author = excluded.author,
                    isbn = excluded.isbn,
                    rating = excluded.rating,
                    avg_rating = excluded.avg_rating,
                    num_pages = excluded.num_pages,
                    date_published = excluded.date_published,
                    date_added = excluded.date_added,
                    date_started = excluded.date_started,
                    date_read = excluded.date_read,
                    review = excluded.review,
                    shelf = excluded.shelf",
                self.books_table
            ))?;
            for book in books {
                stmt.execute(params![
                    user_id,
                    book.title,
                    book.book_url,
                    book.author,
                    book.isbn,
                    book.rating,
                    book.avg_rating,
                    book.num_pages,
                    book.date_published,
                    book.date_added,
                    book.date_started,
                    book.date_read,
                    book.review,
                    book.shelf.as_str(),
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        info!("Upserted {} book records", written);
        Ok(written)
    }

    /// Insert feed rows, silently skipping ones already present. Overlap
    /// at the watermark boundary is expected, so a duplicate key is a
    /// non-event, not an error.
    pub fn insert_feed_items<'a, I>(&mut self, items: I) -> rusqlite::Result<usize>
    where
        I: IntoIterator<Item = &'a FeedActivity>,
    {
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        let mut seen = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR IGNORE INTO {} (user_name, user_url, action, header_text, book_title,
                                           book_url, author, author_url, timestamp, time_ago,
                                           rating, book_description)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                self.feed_table
            ))?;
            for item in items {
                seen += 1;
                inserted += stmt.execute(params![
                    item.user_name,
                    item.user_url,
                    item.action.map(|a| a.as_str()),
                    item.header_text,
                    item.book_title,
                    item.book_url,
                    item.author,
                    item.author_url,
                    item.timestamp,
                    item.time_ago,
                    item.rating,
                    item.book_description,
                ])?;
            }
        }
        tx.commit()?;
        if inserted < seen {
            info!("{} feed items were duplicates and were ignored, as expected", seen - inserted);
        }
        info!("Inserted {} new feed items", inserted);
        Ok(inserted)
    }

    /// The most recent feed timestamp already persisted, or None when the
    /// table is empty (first run: the caller performs a full load).
    pub fn feed_high_watermark(&self) -> rusqlite::Result<Option<DateTime<FixedOffset>>> {
        let max: Option<String> = self.conn.query_row(
            &format!("SELECT MAX(timestamp) FROM {}", self.feed_table),
            [],
            |row| row.get(0),
        )?;
        Ok(max.as_deref().and_then(parse_feed_timestamp))
    }

    /// One challenge row per (user, year), refreshed every run.
    pub fn upsert_challenge(&self, challenge: &ReadingChallenge) -> rusqlite::Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (user_id, year, goal, books_completed, percentage,
                                 books_ahead, books_behind, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(user_id, year) DO UPDATE SET
                    goal = excluded.goal,
                    books_completed = excluded.books_completed,
                    percentage = excluded.percentage,
                    books_ahead = excluded.books_ahead,
                    books_behind = excluded.books_behind,
                    updated_at = excluded.updated_at",
                self.challenge_table
            ),
            params![
                challenge.user_id,
                challenge.year,
                challenge.goal,
                challenge.books_completed,
                challenge.percentage,
                challenge.books_ahead,
                challenge.books_behind,
                challenge.updated_at,
            ],
        )?;
        info!("Updated reading challenge for {}", challenge.year);
        Ok(())
    }

    /// Read back a user's library, for the consumers sitting on top of
    /// the store.
    pub fn get_books(&self, user_id: &str) -> rusqlite::Result<Vec<Book>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT title, book_url, author, isbn, rating, avg_rating, num_pages,
                    date_published, date_added, date_started, date_read, review, shelf
             FROM {} WHERE user_id = ?1 ORDER BY id",
            self.books_table
        ))?;
        let rows = stmt.query_map(params![user_id], |row| {
            let shelf_raw: String = row.get(12)?;
            let shelf = Shelf::parse(&shelf_raw).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Text,
                    format!("unknown shelf value: {}", shelf_raw).into(),
                )
            })?;
            Ok(Book {
                title: row.get(0)?,
                book_url: row.get(1)?,
                author: row.get(2)?,
                isbn: row.get(3)?,
                rating: row.get(4)?,
                avg_rating: row.get(5)?,
                num_pages: row.get(6)?,
                date_published: row.get(7)?,
                date_added: row.get(8)?,
                date_started: row.get(9)?,
                date_read: row.get(10)?,
                review: row.get(11)?,
                shelf,
            })
        })?;

        let mut books = Vec::new();
        for row in rows {
            books.push(row?);
        }
        Ok(books)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                self.metadata_table
            ),
            params![key, value],
        )?;
        info!("Updated system metadata: {}", key);
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", self.metadata_table),
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
    }
}

/// Keep only activities whose timestamp strictly exceeds the watermark.
/// With no watermark the whole batch loads. Items without a parseable
/// timestamp cannot exceed anything and are filtered out once a watermark
/// exists.
pub fn filter_new_activities<'a>(
    items: &'a [FeedActivity],
    watermark: Option<DateTime<FixedOffset>>,
) -> Vec<&'a FeedActivity> {
    let Some(watermark) = watermark else {
        return items.iter().collect();
    };
    items
        .iter()
        .filter(|item| {
            item.timestamp
                .as_deref()
                .and_then(parse_feed_timestamp)
                .is_some_and(|t| t > watermark)
        })
        .collect()
}

/// Feed timestamps are ISO-ish: usually RFC 3339 with an offset, but bare
/// `YYYY-MM-DDTHH:MM:SS` shows up too and is read as UTC.
pub fn parse_feed_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}
