use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Deployment environment; selects which set of tables the store writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Dev,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    /// Environment-qualified table name; dev runs get a `_dev` suffix so
    /// they never touch production tables.
    pub fn qualify(self, table: &str) -> String {
        match self {
            Environment::Production => table.to_string(),
            Environment::Dev => format!("{}_dev", table),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Path of the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory for debug screenshots and local JSON exports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default)]
    pub scrape: ScrapeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    /// Rows requested per listing page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Politeness delay between listing pages in milliseconds.
    #[serde(default = "default_page_delay")]
    pub page_delay_ms: u64,

    /// Hard cap on pages per shelf, guarding against markup drift.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// How long to wait for the feed container to render.
    #[serde(default = "default_feed_wait")]
    pub feed_wait_secs: u64,

    /// Extra settle time after the feed container appears.
    #[serde(default = "default_feed_settle")]
    pub feed_settle_secs: u64,

    /// Only this many of the newest feed entries are extracted.
    #[serde(default = "default_feed_cap")]
    pub max_feed_items: usize,

    #[serde(default = "default_true")]
    pub browser_headless: bool,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_base_url() -> String {
    "https://www.goodreads.com".to_string()
}
fn default_db_path() -> String {
    "katalog.db".to_string()
}
fn default_output_dir() -> String {
    "output".to_string()
}
fn default_per_page() -> u32 {
    100
}
fn default_page_delay() -> u64 {
    500
}
fn default_max_pages() -> u32 {
    100
}
fn default_feed_wait() -> u64 {
    20
}
fn default_feed_settle() -> u64 {
    3
}
fn default_feed_cap() -> usize {
    50
}
fn default_true() -> bool {
    true
}
fn default_window_width() -> u32 {
    1920
}
fn default_window_height() -> u32 {
    1080
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            page_delay_ms: default_page_delay(),
            max_pages: default_max_pages(),
            feed_wait_secs: default_feed_wait(),
            feed_settle_secs: default_feed_settle(),
            max_feed_items: default_feed_cap(),
            browser_headless: default_true(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            db_path: default_db_path(),
            output_dir: default_output_dir(),
            scrape: ScrapeConfig::default(),
        }
    }
}

impl Config {
    /// Read `config.toml` when present, falling back to defaults on any
    /// read or parse problem.
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(cfg) = toml::from_str::<Config>(&content) {
                    return cfg;
                }
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_tables_are_suffixed() {
        assert_eq!(Environment::Dev.qualify("books"), "books_dev");
        assert_eq!(Environment::Production.qualify("books"), "books");
    }

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = Config::default();
        assert_eq!(config.scrape.per_page, 100);
        assert_eq!(config.scrape.page_delay_ms, 500);
        assert_eq!(config.scrape.max_pages, 100);
        assert_eq!(config.scrape.feed_wait_secs, 20);
        assert_eq!(config.scrape.max_feed_items, 50);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str("db_path = \"/tmp/test.db\"").unwrap();
        assert_eq!(config.db_path, "/tmp/test.db");
        assert_eq!(config.base_url, "https://www.goodreads.com");
        assert_eq!(config.scrape.max_pages, 100);
    }
}
