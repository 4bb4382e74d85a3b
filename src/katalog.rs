use crate::browser::FeedBrowser;
use crate::challenge;
use crate::config::Config;
use crate::feed;
use crate::models::{FeedActivity, ReadingChallenge};
use crate::profile::{self, ProfileMetadata};
use crate::session::{Session, USER_AGENT};
use crate::shelves::{Library, ShelfScraper};
use crate::stats::{self, Statistics};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Fatal scrape outcomes. Everything else is contained inside the
/// component that hit it and reported through logs.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    /// The supplied cookie no longer authenticates. It is provisioned
    /// outside the pipeline and cannot be refreshed from here, so there
    /// is nothing to retry.
    #[error("invalid or expired session cookie")]
    SessionInvalid,

    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

/// One full scrape's worth of harvested data.
#[derive(Debug, Serialize)]
pub struct ScrapeData {
    pub profile: ProfileMetadata,
    pub library: Library,
    pub feed: Vec<FeedActivity>,
    pub feed_timed_out: bool,
    pub challenge: Option<ReadingChallenge>,
    pub statistics: Statistics,
    pub scraped_at: String,
}

impl ScrapeData {
    /// Zero extracted library items almost always means the listing
    /// markup drifted, not that the library is empty. An empty feed, by
    /// contrast, is a normal outcome.
    pub fn library_degraded(&self) -> bool {
        self.library.is_empty()
    }
}

/// The scraping pipeline for one (cookie, user) pair. Instances must not
/// be shared across concurrent runs.
pub struct Katalog {
    session: Session,
    config: Config,
}

impl Katalog {
    pub fn new(cookie_string: &str, user_id: &str, config: Config) -> Result<Self, ScrapeError> {
        info!("Initializing Katalog for user_id: {}", user_id);
        let session = Session::new(cookie_string, user_id, &config.base_url)?;
        Ok(Self { session, config })
    }

    pub fn user_id(&self) -> &str {
        self.session.user_id()
    }

    /// Run one scrape cycle: verify the session, then harvest the feed,
    /// the three shelves, profile metadata and the reading challenge,
    /// strictly sequentially, and derive statistics from the result.
    pub async fn scrape(&self) -> Result<ScrapeData, ScrapeError> {
        info!("Starting scrape for user {}", self.session.user_id());

        if !self.session.verify().await {
            return Err(ScrapeError::SessionInvalid);
        }

        info!("Scraping home feed activity...");
        let (feed, feed_timed_out) = self.scrape_feed();

        info!("Scraping books data...");
        let library = ShelfScraper::new(&self.session, &self.config.scrape)
            .scrape_all()
            .await;

        info!("Getting account metadata...");
        let profile = profile::fetch(&self.session).await;

        info!("Getting reading challenge details...");
        let challenge = challenge::fetch(&self.session).await;

        info!("Calculating statistics...");
        let statistics = stats::calculate(library.all());

        info!("Scraping complete!");
        Ok(ScrapeData {
            profile,
            library,
            feed,
            feed_timed_out,
            challenge,
            statistics,
            scraped_at: Utc::now().to_rfc3339(),
        })
    }

    /// Feed harvesting is best-effort: any browser failure degrades to an
    /// empty feed instead of failing the run. Not every account has
    /// recent activity, so an empty feed is valid output.
    fn scrape_feed(&self) -> (Vec<FeedActivity>, bool) {
        let scrape = &self.config.scrape;

        let browser = match FeedBrowser::launch(scrape, Path::new(&self.config.output_dir)) {
            Ok(browser) => browser,
            Err(e) => {
                warn!("Could not launch feed browser: {}", e);
                return (Vec::new(), false);
            }
        };

        let rendered = match browser.render_feed(
            self.session.base_url(),
            USER_AGENT,
            self.session.cookies(),
            feed::FEED_ITEM_SELECTOR,
            Duration::from_secs(scrape.feed_wait_secs),
            Duration::from_secs(scrape.feed_settle_secs),
        ) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Feed render failed: {}", e);
                return (Vec::new(), false);
            }
        };

        let activities = feed::extract_feed(&rendered.html, self.session.base_url(), scrape.max_feed_items);
        (activities, rendered.timed_out)
    }
}
