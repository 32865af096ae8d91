//! Crawl-consent evaluation against robots.txt.

pub mod parser;

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::RobotsConfig;
use self::parser::RobotsPolicy;

/// Outcome of a consent check for one URL.
#[derive(Debug, Clone, Serialize)]
pub struct ConsentDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots_url: Option<String>,
    pub message: String,
}

/// Fetches and evaluates a site's robots.txt for the engine's identity.
///
/// Fail-open by default: an unreachable or unparsable robots.txt is treated
/// as absence of restriction, not as denial. Operators can flip
/// `robots.fail_open` in the config for a fail-closed posture.
pub struct ConsentChecker {
    client: Client,
    cfg: RobotsConfig,
}

impl ConsentChecker {
    pub fn new(cfg: RobotsConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(cfg.timeout_secs))
                .user_agent(cfg.user_agent.clone())
                .build()
                .expect("Failed to build HTTP client"),
            cfg,
        }
    }

    /// Decide whether automated access to `url` is permitted.
    pub async fn check(&self, url: &str) -> ConsentDecision {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return ConsentDecision {
                    allowed: false,
                    robots_url: None,
                    message: format!("Invalid URL: {e}"),
                };
            }
        };

        let Some(host) = parsed.host_str() else {
            return ConsentDecision {
                allowed: false,
                robots_url: None,
                message: "URL has no host".to_string(),
            };
        };

        let robots_url = match parsed.port() {
            Some(port) => format!("{}://{}:{}/robots.txt", parsed.scheme(), host, port),
            None => format!("{}://{}/robots.txt", parsed.scheme(), host),
        };

        let body = match self.fetch_robots(&robots_url).await {
            Ok(body) => body,
            Err(reason) => {
                // robots.txt unavailable: absence of a robots file is absence
                // of restriction under the fail-open policy.
                warn!(%robots_url, %reason, "robots.txt unavailable");
                return if self.cfg.fail_open {
                    ConsentDecision {
                        allowed: true,
                        robots_url: Some(robots_url),
                        message: format!(
                            "robots.txt could not be retrieved ({reason}); treating as unrestricted"
                        ),
                    }
                } else {
                    ConsentDecision {
                        allowed: false,
                        robots_url: Some(robots_url),
                        message: format!(
                            "robots.txt could not be retrieved ({reason}); fail-closed policy denies access"
                        ),
                    }
                };
            }
        };

        let policy = RobotsPolicy::parse(&body);
        let path = parsed.path();
        let allowed = policy.is_allowed(&self.cfg.user_agent, path);
        debug!(%robots_url, %path, allowed, "evaluated robots policy");

        ConsentDecision {
            allowed,
            robots_url: Some(robots_url),
            message: if allowed {
                format!("robots.txt permits access to {path}")
            } else {
                format!("robots.txt disallows access to {path} for {}", self.cfg.user_agent)
            },
        }
    }

    async fn fetch_robots(&self, robots_url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(robots_url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status().as_u16()));
        }

        response.text().await.map_err(|e| e.to_string())
    }
}

impl Default for ConsentChecker {
    fn default() -> Self {
        Self::new(RobotsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_open_when_robots_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(404)
            .create_async()
            .await;

        let checker = ConsentChecker::default();
        let decision = checker.check(&format!("{}/page", server.url())).await;
        assert!(decision.allowed);
        assert!(decision.message.contains("treating as unrestricted"));
    }

    #[tokio::test]
    async fn test_fail_closed_when_configured() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(500)
            .create_async()
            .await;

        let cfg = RobotsConfig {
            fail_open: false,
            ..RobotsConfig::default()
        };
        let checker = ConsentChecker::new(cfg);
        let decision = checker.check(&format!("{}/page", server.url())).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_explicit_disallow() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /private/")
            .create_async()
            .await;

        let checker = ConsentChecker::default();
        let denied = checker
            .check(&format!("{}/private/page", server.url()))
            .await;
        assert!(!denied.allowed);
        assert!(denied.robots_url.as_deref().unwrap().ends_with("/robots.txt"));

        let allowed = checker.check(&format!("{}/public", server.url())).await;
        assert!(allowed.allowed);
    }

    #[tokio::test]
    async fn test_invalid_url_is_denied() {
        let checker = ConsentChecker::default();
        let decision = checker.check("not a url").await;
        assert!(!decision.allowed);
        assert!(decision.robots_url.is_none());
    }
}
