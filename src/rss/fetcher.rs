//! RSS feed fetcher with bounded retries.
//!
//! One fetch is a single HTTP GET with a deadline, a content-type check, a
//! size limit and RSS decoding. [`FeedFetcher::fetch`] repeats failed fetches
//! a fixed number of times with a fixed delay in between.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::rss::types::{ParsedFeed, ParsedItem};
use crate::{NewsaggError, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Why a feed could not be retrieved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The feed URL is not an absolute http(s) URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection, DNS, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// The response is not an XML document.
    #[error("unexpected content type: {0}")]
    ContentType(String),

    /// The body could not be decoded as an RSS document.
    #[error("malformed feed: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether another attempt could succeed. Invalid URLs never will.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl(_))
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    /// Delay between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// RSS feed fetcher.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    retry: RetryPolicy,
    max_feed_size: u64,
}

impl FeedFetcher {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| NewsaggError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry: RetryPolicy {
                attempts: config.attempts.max(1),
                delay: Duration::from_millis(config.retry_delay_ms),
            },
            max_feed_size: config.max_feed_size_bytes,
        })
    }

    /// The retry policy applied by [`fetch`](Self::fetch).
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fetch and parse a feed, retrying failed attempts.
    ///
    /// Returns the first successful result, or the last error once every
    /// attempt has failed.
    pub async fn fetch(&self, url: &str) -> std::result::Result<ParsedFeed, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(feed) => return Ok(feed),
                Err(e) if attempt >= self.retry.attempts || !e.is_retryable() => {
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.retry.attempts,
                        error = %e,
                        "Feed fetch failed, retrying"
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Fetch and parse a feed with a single attempt.
    pub async fn fetch_once(&self, url: &str) -> std::result::Result<ParsedFeed, FetchError> {
        let url = validate_url(url)?;
        debug!(url = %url, "Fetching feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        check_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        )?;

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(FetchError::Malformed(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    content_length, self.max_feed_size
                )));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read response: {}", e)))?;

        if bytes.len() as u64 > self.max_feed_size {
            return Err(FetchError::Malformed(format!(
                "feed too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_feed_size
            )));
        }

        parse_feed(&bytes)
    }
}

/// Validate that a URL is an absolute http(s) URL with a host.
pub fn validate_url(url: &str) -> std::result::Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported URL scheme: {}",
                scheme
            )));
        }
    }

    if parsed.host().is_none() {
        return Err(FetchError::InvalidUrl("URL has no host".to_string()));
    }

    Ok(parsed)
}

/// Normalize a feed URL into the form used as its identity.
///
/// Scheme and host are lower-cased, default ports dropped and an empty path
/// becomes `/`.
pub fn normalize_url(url: &str) -> std::result::Result<String, FetchError> {
    validate_url(url).map(String::from)
}

/// Accept a missing content type or any XML media type.
fn check_content_type(value: Option<&str>) -> std::result::Result<(), FetchError> {
    let Some(value) = value else {
        return Ok(());
    };

    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime == "text/xml" || mime == "application/xml" || mime.ends_with("+xml") {
        Ok(())
    } else {
        Err(FetchError::ContentType(mime))
    }
}

/// Decode an RSS document.
///
/// Items without a link are dropped: the link is what identifies an item.
fn parse_feed(bytes: &[u8]) -> std::result::Result<ParsedFeed, FetchError> {
    let channel =
        rss::Channel::read_from(bytes).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let title = channel.title().trim().to_string();
    let items = channel
        .items()
        .iter()
        .filter_map(|item| {
            let link = item.link().map(str::trim).filter(|l| !l.is_empty());
            let Some(link) = link else {
                debug!(title = item.title().unwrap_or_default(), "Dropping item without link");
                return None;
            };

            Some(ParsedItem {
                title: item.title().unwrap_or("Untitled").trim().to_string(),
                description: item.description().unwrap_or_default().trim().to_string(),
                pub_date: item.pub_date().unwrap_or_default().trim().to_string(),
                link: link.to_string(),
            })
        })
        .collect();

    Ok(ParsedFeed { title, items })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url_valid() {
        assert!(validate_url("https://example.com/feed.xml").is_ok());
        assert!(validate_url("http://example.com/feed.xml").is_ok());
        assert!(validate_url("  http://127.0.0.1:8080/rss  ").is_ok());
    }

    #[test]
    fn test_validate_url_invalid_scheme() {
        let err = validate_url("ftp://example.com/feed.xml").unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));
    }

    #[test]
    fn test_validate_url_not_absolute() {
        assert!(matches!(
            validate_url("/feed.xml"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("").is_err());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM:443/rss").unwrap(),
            "https://example.com/rss"
        );
        assert_eq!(
            normalize_url("http://example.com").unwrap(),
            "http://example.com/"
        );
        assert_eq!(
            normalize_url("http://example.com:8080/a?b=c").unwrap(),
            "http://example.com:8080/a?b=c"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(!FetchError::InvalidUrl("x".into()).is_retryable());
        assert!(FetchError::Network("x".into()).is_retryable());
        assert!(FetchError::Status(500).is_retryable());
        assert!(FetchError::ContentType("text/html".into()).is_retryable());
        assert!(FetchError::Malformed("x".into()).is_retryable());
    }

    #[test]
    fn test_check_content_type() {
        assert!(check_content_type(None).is_ok());
        assert!(check_content_type(Some("text/xml")).is_ok());
        assert!(check_content_type(Some("application/xml; charset=utf-8")).is_ok());
        assert!(check_content_type(Some("application/rss+xml")).is_ok());
        assert!(check_content_type(Some("Application/RSS+XML; charset=UTF-8")).is_ok());
        assert_eq!(
            check_content_type(Some("text/html; charset=utf-8")),
            Err(FetchError::ContentType("text/html".to_string()))
        );
        assert!(check_content_type(Some("application/json")).is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = FetchConfig {
            attempts: 0,
            retry_delay_ms: 25,
            ..FetchConfig::default()
        };
        let fetcher = FeedFetcher::new(&config).unwrap();
        assert_eq!(
            fetcher.retry_policy(),
            RetryPolicy {
                attempts: 1,
                delay: Duration::from_millis(25)
            }
        );
    }

    #[test]
    fn test_parse_feed_rss() {
        let rss = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>https://example.com</link>
    <description>A test feed</description>
    <item>
      <title>Test Title</title>
      <description>Test Description</description>
      <pubDate>Wed, 03 May 2023 15:04:05 +0000</pubDate>
      <link>http://example.com/test</link>
    </item>
    <item>
      <title>Second</title>
      <link>http://example.com/second</link>
    </item>
  </channel>
</rss>"#;

        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(feed.title, "Test Feed");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(
            feed.items[0],
            ParsedItem {
                title: "Test Title".to_string(),
                description: "Test Description".to_string(),
                pub_date: "Wed, 03 May 2023 15:04:05 +0000".to_string(),
                link: "http://example.com/test".to_string(),
            }
        );
        assert_eq!(feed.items[1].title, "Second");
        assert_eq!(feed.items[1].description, "");
        assert_eq!(feed.items[1].pub_date, "");
    }

    #[test]
    fn test_parse_feed_drops_items_without_link() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Feed</title>
    <link>https://example.com</link>
    <description>d</description>
    <item><title>No link</title></item>
    <item><title>Blank link</title><link>   </link></item>
    <item><title>Kept</title><link>https://example.com/kept</link></item>
  </channel>
</rss>"#;

        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].link, "https://example.com/kept");
    }

    #[test]
    fn test_parse_feed_untitled_item() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Feed</title>
    <link>https://example.com</link>
    <description>d</description>
    <item><link>https://example.com/1</link></item>
  </channel>
</rss>"#;

        let feed = parse_feed(rss.as_bytes()).unwrap();
        assert_eq!(feed.items[0].title, "Untitled");
    }

    #[test]
    fn test_parse_feed_invalid() {
        assert!(matches!(
            parse_feed(b"This is not XML"),
            Err(FetchError::Malformed(_))
        ));
        assert!(parse_feed(b"<html><body>hello</body></html>").is_err());
    }
}
