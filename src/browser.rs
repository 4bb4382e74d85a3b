use headless_chrome::protocol::cdp::Network::CookieParam;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use log::{info, warn};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ScrapeConfig;

/// Errors raised while driving the headless browser.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("tab creation failed: {0}")]
    Tab(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("could not read page content: {0}")]
    Content(String),
}

/// Markup pulled out of the rendered feed page. `timed_out` marks the
/// degraded path where the feed container never appeared; whatever markup
/// was present at that point is still returned.
#[derive(Debug)]
pub struct RenderedFeed {
    pub html: String,
    pub timed_out: bool,
}

/// One headless Chrome instance used to render the JS-populated feed.
/// The browser shuts down when this is dropped.
pub struct FeedBrowser {
    browser: Browser,
    debug_dir: PathBuf,
}

impl FeedBrowser {
    pub fn launch(config: &ScrapeConfig, debug_dir: &Path) -> Result<Self, BrowserError> {
        let launch_options = LaunchOptions::default_builder()
            .headless(config.browser_headless)
            .window_size(Some((config.window_width, config.window_height)))
            .args(vec![
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--no-sandbox"),
            ])
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser = Browser::new(launch_options).map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Self {
            browser,
            debug_dir: debug_dir.to_path_buf(),
        })
    }

    /// Render the signed-in home page and return its final markup. The tab
    /// is closed on every path; a missing feed container is a valid
    /// outcome, reported through `timed_out` alongside a debug screenshot.
    pub fn render_feed(
        &self,
        base_url: &str,
        user_agent: &str,
        cookies: &[(String, String)],
        wait_selector: &str,
        wait: Duration,
        settle: Duration,
    ) -> Result<RenderedFeed, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::Tab(e.to_string()))?;
        let rendered = self.render_on_tab(&tab, base_url, user_agent, cookies, wait_selector, wait, settle);
        let _ = tab.close(true);
        rendered
    }

    fn render_on_tab(
        &self,
        tab: &Arc<Tab>,
        base_url: &str,
        user_agent: &str,
        cookies: &[(String, String)],
        wait_selector: &str,
        wait: Duration,
        settle: Duration,
    ) -> Result<RenderedFeed, BrowserError> {
        if let Err(e) = tab.set_user_agent(user_agent, None, None) {
            warn!("Could not override browser user agent: {}", e);
        }

        let domain = cookie_domain(base_url);
        let params: Vec<CookieParam> = cookies
            .iter()
            .map(|(name, value)| CookieParam {
                name: name.clone(),
                value: value.clone(),
                url: None,
                domain: Some(domain.clone()),
                path: Some("/".to_string()),
                secure: None,
                http_only: None,
                same_site: None,
                expires: None,
                priority: None,
                same_party: None,
                source_scheme: None,
                source_port: None,
                partition_key: None,
            })
            .collect();
        if !params.is_empty() {
            tab.set_cookies(params)
                .map_err(|e| BrowserError::Navigation(format!("setting cookies: {}", e)))?;
        }

        info!("Browser navigating to: {}", base_url);
        tab.navigate_to(base_url)
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;
        tab.wait_until_navigated()
            .map_err(|e| BrowserError::Navigation(e.to_string()))?;

        let timed_out = match tab.wait_for_element_with_custom_timeout(wait_selector, wait) {
            Ok(_) => {
                info!("Feed container found, letting the page settle...");
                std::thread::sleep(settle);
                false
            }
            Err(e) => {
                warn!("Timed out waiting for feed items: {}", e);
                self.save_debug_screenshot(tab);
                true
            }
        };

        let html = tab
            .get_content()
            .map_err(|e| BrowserError::Content(e.to_string()))?;

        Ok(RenderedFeed { html, timed_out })
    }

    /// Advisory artifact for diagnosing markup drift; never read back.
    fn save_debug_screenshot(&self, tab: &Arc<Tab>) {
        let bytes = match tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Could not capture debug screenshot: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::create_dir_all(&self.debug_dir) {
            warn!("Could not create debug directory {}: {}", self.debug_dir.display(), e);
            return;
        }
        let path = self.debug_dir.join("debug_screenshot.png");
        match std::fs::write(&path, bytes) {
            Ok(()) => info!("Saved debug screenshot to {}", path.display()),
            Err(e) => warn!("Could not write debug screenshot: {}", e),
        }
    }
}

/// Cookie domain for a site root, e.g. `https://www.goodreads.com` ->
/// `.goodreads.com`.
fn cookie_domain(base_url: &str) -> String {
    let host = base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = host.split('/').next().unwrap_or(host);
    let host = host.strip_prefix("www.").unwrap_or(host);
    format!(".{}", host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_domain_drops_scheme_and_www() {
        assert_eq!(cookie_domain("https://www.goodreads.com"), ".goodreads.com");
        assert_eq!(cookie_domain("http://example.org/feed"), ".example.org");
        assert_eq!(cookie_domain("https://books.example.org"), ".books.example.org");
    }

    #[test]
    #[ignore] // Requires Chrome/Chromium
    fn browser_launches_with_defaults() {
        let config = ScrapeConfig::default();
        let browser = FeedBrowser::launch(&config, Path::new("output"));
        assert!(browser.is_ok());
    }
}
