use katalog::config::{Config, Environment};
use katalog::katalog::{Katalog, ScrapeData, ScrapeError};
use katalog::store::{self, Store};
use katalog::output;
use log::{error, info, warn};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cookie = std::env::var("GOODREADS_COOKIE").unwrap_or_default();
    let user_id = std::env::var("GOODREADS_USER_ID").unwrap_or_default();
    if cookie.is_empty() || user_id.is_empty() {
        error!("GOODREADS_COOKIE or GOODREADS_USER_ID not set. Exiting.");
        return ExitCode::FAILURE;
    }

    let environment = Environment::from_env();
    let config = Config::load();

    let scraper = match Katalog::new(&cookie, &user_id, config.clone()) {
        Ok(scraper) => scraper,
        Err(e) => {
            error!("Failed to initialize scraper: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let data = match scraper.scrape().await {
        Ok(data) => data,
        Err(ScrapeError::SessionInvalid) => {
            error!("Session verification failed. Please update the session cookie. Aborting scrape.");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!("Scrape job failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if data.library_degraded() {
        warn!("Scrape finished with zero library items; the listing markup may have changed upstream");
    }
    if data.feed_timed_out {
        warn!("Feed render timed out; feed results may be incomplete");
    }

    if !environment.is_production() {
        output::save_local(&data, &config.output_dir);
    }

    sync_to_store(&scraper, &data, &config, environment);

    info!("Scrape job finished");
    ExitCode::SUCCESS
}

/// Commit one run's data. Each table's write is independent: a failure is
/// logged and the remaining writes still happen.
fn sync_to_store(scraper: &Katalog, data: &ScrapeData, config: &Config, environment: Environment) {
    info!("Attempting to save data to the store...");

    let mut store = match Store::open(&config.db_path, environment) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open store at {}: {}", config.db_path, e);
            return;
        }
    };

    let watermark = match store.feed_high_watermark() {
        Ok(Some(watermark)) => {
            info!("Found feed high-water mark: {}", watermark);
            Some(watermark)
        }
        Ok(None) => {
            info!("No existing data in the feed table. Will perform a full load.");
            None
        }
        Err(e) => {
            error!("Error fetching feed high-water mark: {}", e);
            None
        }
    };
    let new_items = store::filter_new_activities(&data.feed, watermark);
    if let Err(e) = store.insert_feed_items(new_items) {
        error!("Error inserting feed data: {}", e);
    }

    if data.library.is_empty() {
        info!("No books found in scrape data. Nothing to upsert.");
    } else if let Err(e) = store.upsert_books(scraper.user_id(), data.library.all()) {
        error!("Error upserting book data: {}", e);
    }

    if let Some(challenge) = &data.challenge {
        if let Err(e) = store.upsert_challenge(challenge) {
            error!("Error upserting reading challenge: {}", e);
        }
    }

    match serde_json::to_string(&data.profile) {
        Ok(json) => {
            if let Err(e) = store.set_metadata("profile", &json) {
                error!("Error updating profile metadata: {}", e);
            }
        }
        Err(e) => error!("Error serializing profile metadata: {}", e),
    }
    if let Err(e) = store.set_metadata("last_scrape_at", &data.scraped_at) {
        error!("Error updating last scrape timestamp: {}", e);
    }

    info!("Store sync complete.");
}
