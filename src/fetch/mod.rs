//! Page fetching with timeout, redirect, and user-agent policy.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{redirect, Client};

use crate::config::FetchConfig;

/// Realistic client identities, picked at random per request. Some sites
/// serve stripped or blocked pages to obvious bot agents.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request for {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Retrieves raw HTML for already-validated http/https URLs.
///
/// No retry at this layer: a failed fetch is reported to the caller and the
/// next attempt is the next scheduled firing.
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    pub fn new(cfg: &FetchConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .redirect(redirect::Policy::limited(cfg.max_redirects))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }

    /// Fetch `url` and return the response body as text.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, agent)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| FetchError::Network {
            url: url.to_string(),
            source: e,
        })
    }
}

impl Default for PageFetcher {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/page")
            .with_status(200)
            .with_body("<html><body>hello</body></html>")
            .create_async()
            .await;

        let fetcher = PageFetcher::default();
        let body = fetcher.fetch(&format!("{}/page", server.url())).await.unwrap();
        assert!(body.contains("hello"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let fetcher = PageFetcher::default();
        let err = fetcher
            .fetch(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();
        match err {
            FetchError::Status { status, .. } => assert_eq!(status, 404),
            other => panic!("expected status error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_sends_a_known_user_agent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ua")
            .match_request(|req| {
                req.header("user-agent")
                    .first()
                    .map(|v| {
                        let v = v.to_str().unwrap_or("");
                        USER_AGENTS.contains(&v)
                    })
                    .unwrap_or(false)
            })
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let fetcher = PageFetcher::default();
        fetcher.fetch(&format!("{}/ua", server.url())).await.unwrap();
        mock.assert_async().await;
    }
}
