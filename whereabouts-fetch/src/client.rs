//! HTTP client for X's about-page GraphQL endpoint.
//!
//! Maps the wire-level result onto [`FetchOutcome`]: HTTP 429 is the
//! shared-quota signal, any other failure (transport, status, parse) is a
//! per-username transient failure, and a 2xx body either yields a
//! sanitized location or settles as a final not-found.

use reqwest::{Client, StatusCode};
use whereabouts_core::{Location, Username};

use crate::types::AboutResponse;
use crate::{FetchOutcome, ProfileFetcher};

use async_trait::async_trait;

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://x.com/i/api";

/// GraphQL persisted-query id for `AboutAccountQuery`. Rotates with the
/// web client; override with [`AboutPageClient::with_query_id`] when it
/// does.
const DEFAULT_QUERY_ID: &str = "XRqGa7EeokUU5kppkh13EA";

/// Credentials for the about-page endpoint.
///
/// The endpoint authenticates like the web client: a bearer token plus the
/// session's CSRF token. Neither is validated here; a rejected credential
/// simply settles lookups as transient failures.
#[derive(Debug, Clone)]
pub struct ClientAuth {
    /// OAuth2 bearer token.
    pub bearer_token: String,
    /// Session CSRF token (the `ct0` cookie value), if available.
    pub csrf_token: Option<String>,
}

impl ClientAuth {
    /// Create credentials from a bearer token.
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: bearer_token.into(),
            csrf_token: None,
        }
    }

    /// Attach the session CSRF token.
    pub fn with_csrf_token(mut self, csrf_token: impl Into<String>) -> Self {
        self.csrf_token = Some(csrf_token.into());
        self
    }

    /// Create credentials from environment variables.
    ///
    /// # Environment Variables
    /// - `WHEREABOUTS_BEARER_TOKEN`: bearer token (required; empty if unset)
    /// - `WHEREABOUTS_CSRF_TOKEN`: CSRF token (optional)
    pub fn from_env() -> Self {
        Self {
            bearer_token: std::env::var("WHEREABOUTS_BEARER_TOKEN").unwrap_or_default(),
            csrf_token: std::env::var("WHEREABOUTS_CSRF_TOKEN").ok(),
        }
    }
}

/// [`ProfileFetcher`] backed by the about-page GraphQL endpoint.
pub struct AboutPageClient {
    client: Client,
    base_url: String,
    query_id: String,
    auth: ClientAuth,
}

impl AboutPageClient {
    /// Create a client with the default endpoint and query id.
    pub fn new(auth: ClientAuth) -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            query_id: DEFAULT_QUERY_ID.to_string(),
            auth,
        }
    }

    /// Override the API base URL (test servers, mirrors).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the persisted-query id.
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.query_id = query_id.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/graphql/{}/AboutAccountQuery",
            self.base_url, self.query_id
        )
    }
}

#[async_trait]
impl ProfileFetcher for AboutPageClient {
    async fn fetch(&self, username: &Username) -> FetchOutcome {
        let variables = serde_json::json!({ "screenName": username.as_str() }).to_string();

        let mut request = self
            .client
            .get(self.endpoint())
            .query(&[("variables", variables.as_str())])
            .header("accept", "*/*")
            .header("content-type", "application/json")
            .header(
                "authorization",
                format!("Bearer {}", self.auth.bearer_token),
            )
            .header("x-twitter-active-user", "yes")
            .header("x-twitter-auth-type", "OAuth2Session")
            .header("x-twitter-client-language", "en");

        if let Some(csrf_token) = &self.auth.csrf_token {
            request = request.header("x-csrf-token", csrf_token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(username = %username, error = %e, "about-page request failed");
                return FetchOutcome::TransientFailure;
            }
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(username = %username, "about-page endpoint rate limited");
            return FetchOutcome::RateLimited;
        }
        if !status.is_success() {
            tracing::debug!(username = %username, status = %status, "about-page request rejected");
            return FetchOutcome::TransientFailure;
        }

        let body: AboutResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(username = %username, error = %e, "about-page response unparseable");
                return FetchOutcome::TransientFailure;
            }
        };

        match body.account_based_in().and_then(Location::sanitize) {
            Some(location) => FetchOutcome::Found(location),
            None => FetchOutcome::NotFound,
        }
    }
}

impl std::fmt::Debug for AboutPageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AboutPageClient")
            .field("base_url", &self.base_url)
            .field("query_id", &self.query_id)
            .field("bearer_token", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
