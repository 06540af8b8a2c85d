//! Fetch service: the HTTP boundary of the harvester
//!
//! Everything transport-related lives behind the [`FetchService`] trait so
//! the orchestrator's state machine can be exercised with canned fragments.
//! The production implementation handles:
//! - Per-catalog session affinity (one cookie jar per session key)
//! - Pre-obtained session cookies from a JSON export
//! - Timeouts, pacing delay, and retry on transient status codes
//!
//! The orchestrator never retries; a failure returned from here is final for
//! that one request.

use crate::config::{FetchConfig, SessionConfig};
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Status codes retried before the failure is surfaced
const TRANSIENT_STATUS: &[u16] = &[408, 429, 500, 502, 503, 504, 522, 524];

const USER_AGENT: &str = concat!("modharvest/", env!("CARGO_PKG_VERSION"));

/// Errors surfaced by the fetch service after its retry policy is exhausted
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Request timeout for {url} after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// One described request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,

    /// Groups requests into one session/cookie-jar stream; all requests for
    /// one catalog share a key
    pub session_key: u32,

    /// Marks the request as an AJAX call (adds the XHR header)
    pub ajax: bool,
}

impl FetchRequest {
    /// A plain page fetch
    pub fn page(url: impl Into<String>, session_key: u32) -> Self {
        Self {
            url: url.into(),
            session_key,
            ajax: false,
        }
    }

    /// An AJAX fragment fetch
    pub fn ajax(url: impl Into<String>, session_key: u32) -> Self {
        Self {
            url: url.into(),
            session_key,
            ajax: true,
        }
    }
}

/// A successful response body with its final URL after redirects
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// The transport contract consumed by the orchestrator
#[async_trait]
pub trait FetchService: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// One cookie from a browser JSON export
#[derive(Debug, Clone, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
}

/// Loads session cookies from a JSON export, keeping only entries whose
/// domain matches the catalog host.
pub fn load_session_cookies(path: &Path, host: &str) -> Result<Vec<SessionCookie>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Cookies(format!("{}: {}", path.display(), e)))?;

    let all: Vec<SessionCookie> = serde_json::from_str(&content)
        .map_err(|e| ConfigError::Cookies(format!("{}: {}", path.display(), e)))?;

    Ok(all
        .into_iter()
        .filter(|cookie| cookie.domain.contains(host) || host.contains(&cookie.domain))
        .collect())
}

/// Production fetch service over reqwest
///
/// One lazily-built client per session key; each client gets its own cookie
/// jar seeded with the loaded session cookies so catalogs never share
/// server-side session state.
pub struct HttpFetchService {
    config: FetchConfig,
    base_url: Url,
    cookies: Vec<SessionCookie>,
    clients: Mutex<HashMap<u32, Client>>,
}

impl HttpFetchService {
    /// Creates the fetch service, loading session cookies when configured.
    /// An unreadable cookies file is logged and skipped; the catalog's
    /// public pages are still worth harvesting.
    pub fn new(config: FetchConfig, base_url: Url, session: &SessionConfig) -> Self {
        let cookies = match &session.cookies_file {
            Some(path) => {
                let host = base_url.host_str().unwrap_or_default();
                match load_session_cookies(Path::new(path), host) {
                    Ok(cookies) => {
                        tracing::info!("Loaded {} session cookies from {}", cookies.len(), path);
                        cookies
                    }
                    Err(e) => {
                        tracing::error!("Failed to load cookies, continuing without: {}", e);
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        Self {
            config,
            base_url,
            cookies,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Gets or builds the client owning `session_key`'s cookie jar
    fn client_for(&self, session_key: u32) -> Result<Client, FetchError> {
        let mut clients = self.clients.lock().unwrap();

        if let Some(client) = clients.get(&session_key) {
            return Ok(client.clone());
        }

        let jar = Arc::new(Jar::default());
        for cookie in &self.cookies {
            jar.add_cookie_str(
                &format!("{}={}", cookie.name, cookie.value),
                &self.base_url,
            );
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        clients.insert(session_key, client.clone());
        tracing::debug!("Created session client for key {}", session_key);
        Ok(client)
    }
}

#[async_trait]
impl FetchService for HttpFetchService {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let client = self.client_for(request.session_key)?;

        // Pacing delay applies to every request, not just retries
        if self.config.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        }

        let max_attempts = self.config.retry_max + 1;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let mut builder = client.get(&request.url);
            if request.ajax {
                builder = builder.header("X-Requested-With", "XMLHttpRequest");
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let final_url = response.url().to_string();

                    if TRANSIENT_STATUS.contains(&status) {
                        tracing::debug!(
                            "Transient HTTP {} for {} (attempt {}/{})",
                            status,
                            request.url,
                            attempt,
                            max_attempts
                        );
                        last_error = Some(FetchError::Status {
                            url: request.url.clone(),
                            status,
                            attempts: attempt,
                        });
                    } else if !response.status().is_success() {
                        return Err(FetchError::Status {
                            url: request.url.clone(),
                            status,
                            attempts: attempt,
                        });
                    } else {
                        match response.text().await {
                            Ok(body) => {
                                return Ok(FetchResponse {
                                    final_url,
                                    status,
                                    body,
                                })
                            }
                            Err(e) => {
                                return Err(FetchError::Network {
                                    url: request.url.clone(),
                                    message: e.to_string(),
                                })
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    tracing::debug!(
                        "Timeout for {} (attempt {}/{})",
                        request.url,
                        attempt,
                        max_attempts
                    );
                    last_error = Some(FetchError::Timeout {
                        url: request.url.clone(),
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_connect() => {
                    tracing::debug!(
                        "Connect error for {} (attempt {}/{})",
                        request.url,
                        attempt,
                        max_attempts
                    );
                    last_error = Some(FetchError::Network {
                        url: request.url.clone(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    return Err(FetchError::Network {
                        url: request.url.clone(),
                        message: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts && self.config.retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        Err(last_error.unwrap_or(FetchError::Network {
            url: request.url,
            message: "retries exhausted".to_string(),
        }))
    }
}
