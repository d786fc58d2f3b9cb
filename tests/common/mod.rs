//! Test helpers for integration tests.
//!
//! Provides a local HTTP server serving RSS fixtures and configuration helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use newsagg::config::{Config, FetchConfig, IngestConfig, QueueConfig};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// RSS content type served by default.
pub const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// How one path of the [`FeedServer`] answers.
#[derive(Debug, Clone)]
pub struct FeedRoute {
    pub status: u16,
    pub content_type: String,
    pub body: String,
    /// Answer this many requests with 500 before switching to `status`.
    pub fail_first: usize,
    /// Wait before answering.
    pub delay: Duration,
}

impl FeedRoute {
    /// A healthy feed.
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: RSS_CONTENT_TYPE.to_string(),
            body: body.into(),
            fail_first: 0,
            delay: Duration::ZERO,
        }
    }

    /// A path that always answers with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            body: String::new(),
            fail_first: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn with_fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, FeedRoute>>,
    hits: Mutex<HashMap<String, usize>>,
}

/// Local HTTP server answering feed requests and counting hits per path.
pub struct FeedServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FeedServer {
    /// Bind an ephemeral port and serve `routes`. Unknown paths answer 404.
    pub async fn start(routes: Vec<(&str, FeedRoute)>) -> Self {
        let state = Arc::new(ServerState::default());
        {
            let mut map = state.routes.lock().unwrap();
            for (path, route) in routes {
                map.insert(path.to_string(), route);
            }
        }

        let app = Router::new()
            .fallback(serve_feed)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            state,
            shutdown: Some(tx),
        }
    }

    /// Absolute URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    /// Replace the answer for `path`.
    pub fn set_route(&self, path: &str, route: FeedRoute) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(path.to_string(), route);
    }

    /// Wait until `path` has been requested at least `n` times.
    pub async fn wait_for_hits(&self, path: &str, n: usize) {
        tokio::time::timeout(DEFAULT_TIMEOUT, async {
            while self.hits(path) < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

impl Drop for FeedServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve_feed(State(state): State<Arc<ServerState>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let hit = {
        let mut hits = state.hits.lock().unwrap();
        let count = hits.entry(path.clone()).or_insert(0);
        *count += 1;
        *count
    };

    let route = state.routes.lock().unwrap().get(&path).cloned();
    let Some(route) = route else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    if hit <= route.fail_first {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let status = StatusCode::from_u16(route.status).unwrap();
    (status, [(header::CONTENT_TYPE, route.content_type)], route.body).into_response()
}

/// One `<item>` of an RSS fixture.
pub struct Item<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub pub_date: &'a str,
}

/// Build an RSS 2.0 document.
pub fn rss_document(title: &str, items: &[Item<'_>]) -> String {
    let mut body = String::new();
    for item in items {
        body.push_str(&format!(
            "<item><title>{}</title><link>{}</link><description>About {}</description><pubDate>{}</pubDate></item>",
            item.title, item.link, item.title, item.pub_date
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
<title>{title}</title>
<link>https://example.com/</link>
<description>Test feed</description>
{body}
</channel>
</rss>"#
    )
}

/// A valid RFC 2822 publication date.
pub const VALID_DATE: &str = "Wed, 03 May 2023 15:04:05 +0000";

/// Fetch settings with short delays.
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        attempts: 3,
        retry_delay_ms: 20,
        timeout_secs: 5,
        connect_timeout_secs: 2,
        ..FetchConfig::default()
    }
}

/// Configuration for `feeds` with fast retries and a queue under `queue_dir`.
pub fn test_config(feeds: Vec<String>, queue_dir: &std::path::Path) -> Config {
    Config {
        ingest: IngestConfig {
            feeds,
            workers: 2,
            queue_capacity: 16,
            ..IngestConfig::default()
        },
        fetch: fast_fetch_config(),
        queue: QueueConfig {
            url: format!("sqlite://{}", queue_dir.join("queue.db").display()),
            workers: 2,
            poll_interval_ms: 20,
            ..QueueConfig::default()
        },
        ..Config::default()
    }
}
