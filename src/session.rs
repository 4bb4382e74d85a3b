use log::{error, info, warn};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{redirect, Client, Response, StatusCode};
use scraper::{Html, Selector};
use std::time::Duration;

/// Fixed browser identity presented on every request. The site gates on
/// a realistic user agent and XHR headers.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// An authenticated HTTP session built from an externally supplied cookie
/// string. One session is scoped to one (cookie, user) pair.
pub struct Session {
    client: Client,
    base_url: String,
    user_id: String,
    cookies: Vec<(String, String)>,
}

impl Session {
    pub fn new(cookie_string: &str, user_id: &str, base_url: &str) -> Result<Self, reqwest::Error> {
        let cookies = parse_cookie_string(cookie_string);

        let mut headers = HeaderMap::new();
        headers.insert("Accept", "application/json, text/javascript, */*; q=0.01".parse().unwrap());
        headers.insert("Accept-Language", "en-US,en;q=0.9".parse().unwrap());
        headers.insert("X-Requested-With", "XMLHttpRequest".parse().unwrap());
        headers.insert("Referer", format!("{}/", base_url).parse().unwrap());
        headers.insert("Origin", base_url.parse().unwrap());
        headers.insert("DNT", "1".parse().unwrap());
        headers.insert("Connection", "keep-alive".parse().unwrap());
        headers.insert("Sec-Fetch-Dest", "empty".parse().unwrap());
        headers.insert("Sec-Fetch-Mode", "cors".parse().unwrap());
        headers.insert("Sec-Fetch-Site", "same-origin".parse().unwrap());
        if !cookies.is_empty() {
            match HeaderValue::from_str(&cookie_header(&cookies)) {
                Ok(value) => {
                    headers.insert("Cookie", value);
                }
                Err(e) => warn!("Cookie string contains invalid header bytes: {}", e),
            }
        }

        // Redirects stay disabled for the whole session: the verification
        // check needs the raw 3xx, and an unexpected redirect on a listing
        // page counts as a non-200 for the pagination policy.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(30))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            cookies,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Parsed cookie pairs, for handing to the browser context.
    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    pub async fn get(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.client.get(url).send().await
    }

    /// Check the cookie still authenticates by looking for the
    /// "edit profile" marker on our own profile page. A dead session is a
    /// normal outcome here: the result is a boolean, never an error.
    pub async fn verify(&self) -> bool {
        let url = format!("{}/user/show/{}", self.base_url, self.user_id);

        let response = match self.client.get(&url).timeout(Duration::from_secs(10)).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Error verifying session: {}", e);
                return false;
            }
        };

        let status = response.status();
        if status.is_redirection() {
            warn!(
                "Session invalid (redirected to {:?})",
                response.headers().get("location")
            );
            return false;
        }
        if status != StatusCode::OK {
            warn!("Session invalid (got HTTP status {})", status);
            return false;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!("Error reading profile page: {}", e);
                return false;
            }
        };

        if profile_is_own(&body) {
            info!("Session valid for user ID: {} (found edit-profile link)", self.user_id);
            true
        } else {
            warn!("Session invalid (landed on profile but found no edit-profile link)");
            false
        }
    }
}

/// A profile page is ours when it carries the edit-profile link.
pub fn profile_is_own(html: &str) -> bool {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"a[href="/user/edit"]"#).unwrap();
    document.select(&selector).next().is_some()
}

/// Parse a raw `k=v; k2=v2` cookie string into ordered pairs. Pairs
/// without an `=` are ignored; a repeated key overwrites the earlier
/// value.
pub fn parse_cookie_string(raw: &str) -> Vec<(String, String)> {
    let mut cookies: Vec<(String, String)> = Vec::new();
    for pair in raw.split(';') {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() {
            continue;
        }
        if let Some(existing) = cookies.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
        } else {
            cookies.push((key.to_string(), value.to_string()));
        }
    }
    cookies
}

fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_string_parses_valid_pairs() {
        let cookies = parse_cookie_string("a=1; b=2;c=3");
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn cookie_string_ignores_malformed_pairs() {
        let cookies = parse_cookie_string("a=1; garbage; =orphan; b=2");
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn cookie_string_last_value_wins() {
        let cookies = parse_cookie_string("session=old; other=x; session=new");
        assert_eq!(
            cookies,
            vec![
                ("session".to_string(), "new".to_string()),
                ("other".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn cookie_values_may_contain_equals_signs() {
        let cookies = parse_cookie_string("token=abc=def==");
        assert_eq!(cookies, vec![("token".to_string(), "abc=def==".to_string())]);
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let cookies = parse_cookie_string("a=1; b=2");
        assert_eq!(cookie_header(&cookies), "a=1; b=2");
    }

    #[test]
    fn own_profile_detected_by_edit_link() {
        let html = r#"<html><body><a href="/user/edit">Edit profile</a></body></html>"#;
        assert!(profile_is_own(html));
    }

    #[test]
    fn foreign_profile_has_no_edit_link() {
        let html = r#"<html><body><a href="/user/show/1">Someone</a></body></html>"#;
        assert!(!profile_is_own(html));
    }
}
