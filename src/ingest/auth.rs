//! Authentication session
//!
//! Wraps one source's outbound HTTP with its authentication lifecycle. The
//! contract is deliberately narrow: on a 401 or 403 the session refreshes
//! its token at most once and retries the request at most once, and the
//! retried response is final whatever its status. Callers always receive
//! the upstream's actual status and body, never a reinterpretation.

use metrics::counter;
use reqwest::header::{AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::ingest::token_discovery::discover_tokens;
use crate::models::source;
use crate::repositories::SourceRepository;

/// Bearer authentication mode marker stored on the source row
pub const AUTH_MODE_BEARER: &str = "bearer";
/// No-authentication mode marker stored on the source row
pub const AUTH_MODE_NONE: &str = "none";

/// Where the session stands with the upstream's auth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token attached yet, or the source does not use one
    Unauthenticated,
    /// A token is attached and has not been rejected
    Authenticated,
    /// A refresh round-trip is underway
    RefreshInFlight,
}

/// One upstream request, fully specified so the session can replay it after
/// a token refresh.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: Url,
    /// Raw request body; `None` sends no body and no content-type
    pub body: Option<Vec<u8>>,
    /// Conditional-request token from the last successful pass
    pub if_none_match: Option<String>,
}

/// What the upstream actually answered, preserved verbatim.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub not_modified: bool,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-pass authentication session for one source.
///
/// Holds a working copy of the source's tokens; a successful refresh writes
/// them back through the repository before the retry goes out.
pub struct AuthSession {
    http: Client,
    repo: SourceRepository,
    source: source::Model,
    state: AuthState,
}

impl AuthSession {
    pub fn new(http: Client, repo: SourceRepository, source: source::Model) -> Self {
        let state = if bearer_token(&source).is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        Self {
            http,
            repo,
            source,
            state,
        }
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Execute a request under the session's auth contract.
    ///
    /// A 401/403 on a bearer source triggers one token refresh and one
    /// retry; the retry's response is returned as-is whatever its status.
    /// If the refresh yields no usable token the original rejection is
    /// surfaced as [`IngestError::AuthRejected`] with its body intact.
    pub async fn fetch(&mut self, spec: &RequestSpec) -> Result<UpstreamResponse, IngestError> {
        let first = self.send(spec).await?;

        let rejected = first.status == StatusCode::UNAUTHORIZED.as_u16()
            || first.status == StatusCode::FORBIDDEN.as_u16();
        if !rejected || self.source.auth_mode != AUTH_MODE_BEARER {
            return Ok(first);
        }

        info!(
            source_id = %self.source.id,
            status = first.status,
            "Upstream rejected credentials, refreshing token"
        );
        counter!("ingest_auth_rejections_total").increment(1);

        if !self.refresh().await? {
            counter!("ingest_auth_refresh_failures_total").increment(1);
            return Err(IngestError::AuthRejected {
                status: first.status,
                content_type: first.content_type,
                body: first.body,
            });
        }

        // The retried response is final, success or not.
        self.send(spec).await
    }

    /// Refresh tokens from the source's auth endpoint.
    ///
    /// Returns `false` when the auth endpoint answered but no access token
    /// could be discovered in its response.
    async fn refresh(&mut self) -> Result<bool, IngestError> {
        let auth_endpoint = self
            .source
            .auth_endpoint
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                IngestError::Configuration(format!(
                    "source {} uses bearer auth but has no auth endpoint",
                    self.source.id
                ))
            })?;
        let auth_url = Url::parse(auth_endpoint).map_err(|e| {
            IngestError::Configuration(format!("invalid auth endpoint URL: {}", e))
        })?;

        self.state = AuthState::RefreshInFlight;

        let mut request = self.http.post(auth_url);
        if let Some(payload) = &self.source.auth_payload {
            request = request.json(payload);
        }
        let response = request.send().await?;
        let body = response.bytes().await?;

        // Auth endpoints double-encode too; undo one layer before scanning
        let body = crate::ingest::unwrap::unwrap_payload(&body);
        let Ok(JsonValue::Object(decoded)) = serde_json::from_slice::<JsonValue>(&body) else {
            warn!(source_id = %self.source.id, "Auth endpoint response was not a JSON object");
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        };

        let tokens = discover_tokens(&decoded);
        if !tokens.has_access_token() {
            warn!(source_id = %self.source.id, "No access token discovered in auth response");
            self.state = AuthState::Unauthenticated;
            return Ok(false);
        }

        debug!(
            source_id = %self.source.id,
            has_refresh_token = !tokens.refresh_token.is_empty(),
            expires_in_seconds = tokens.expires_in_seconds,
            "Discovered fresh tokens"
        );
        counter!("ingest_auth_refreshes_total").increment(1);

        let refresh_token = (!tokens.refresh_token.is_empty()).then(|| tokens.refresh_token.clone());
        self.repo
            .persist_tokens(self.source.id, tokens.access_token.clone(), refresh_token.clone())
            .await?;

        self.source.access_token = Some(tokens.access_token);
        if refresh_token.is_some() {
            self.source.refresh_token = refresh_token;
        }
        self.state = AuthState::Authenticated;
        Ok(true)
    }

    async fn send(&self, spec: &RequestSpec) -> Result<UpstreamResponse, IngestError> {
        let mut request = self.http.request(spec.method.clone(), spec.url.clone());

        if let Some(token) = bearer_token(&self.source) {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(etag) = &spec.if_none_match {
            request = request.header(IF_NONE_MATCH, etag.clone());
        }
        if let Some(body) = &spec.body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let not_modified = response.status() == StatusCode::NOT_MODIFIED;
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse {
            status,
            etag,
            content_type,
            not_modified,
            body,
        })
    }
}

/// The token to attach, if the source's mode and state call for one.
///
/// Only bearer-mode sources with a non-empty stored token get an
/// `Authorization` header; everything else goes out bare.
fn bearer_token(source: &source::Model) -> Option<&str> {
    if source.auth_mode != AUTH_MODE_BEARER {
        return None;
    }
    source
        .access_token
        .as_deref()
        .filter(|token| !token.is_empty())
}
