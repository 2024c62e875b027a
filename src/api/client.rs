//! Authenticated request pipeline for the practice-room backend.
//!
//! Every call carries the stored access token as a bearer credential and runs
//! under the configured waiting time. A 401/403 triggers one refresh through
//! `POST /refresh` and exactly one retry. Irrecoverable auth failures end in a
//! sign-out dispatch instead of a typed error.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use tokio::sync::Mutex;

use super::auth::{CredentialStore, TokenKind};
use super::types::RefreshResponse;
use crate::config::Config;
use crate::session::{AuthAction, AuthDispatcher};

/// Fixed endpoint exchanging a refresh token for a new access token.
pub const REFRESH_ENDPOINT: &str = "refresh";

/// What to do when the backend cannot be reached at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkFailurePolicy {
    /// Hand the transport error to the caller; credentials stay untouched.
    #[default]
    Report,
    /// Treat the failure like a rejected credential and sign out.
    SignOut,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// One logical call. Borrowed by the pipeline so the retry is identical.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Url-encoded form body (`application/x-www-form-urlencoded`).
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.body = Some(RequestBody::Form(fields));
        self
    }
}

/// Result of one pass through the pipeline.
#[derive(Debug)]
pub enum Outcome {
    /// The backend answered; any status, uninterpreted.
    Response(Response),
    /// The waiting time elapsed and the call was cancelled.
    Aborted,
    /// Sign-out was dispatched; the call did not complete.
    SignedOut,
    /// The backend could not be reached (only under `NetworkFailurePolicy::Report`).
    Unreachable(reqwest::Error),
}

impl Outcome {
    pub fn into_response(self) -> Option<Response> {
        match self {
            Outcome::Response(r) => Some(r),
            _ => None,
        }
    }
}

enum Attempt {
    Done(Response),
    TimedOut,
    Failed(reqwest::Error),
}

enum Refresh {
    Refreshed(String),
    Rejected,
    TimedOut,
    Unreachable(reqwest::Error),
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn bearer(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token)).ok()?;
    value.set_sensitive(true);
    Some(value)
}

/// HTTP client wrapper for practice-room API communication.
///
/// Shared via `Arc`; concurrent callers hitting token expiry together are
/// funnelled through a single refresh.
pub struct ApiClient {
    client: Client,
    base_url: String,
    waiting_time: Duration,
    network_policy: NetworkFailurePolicy,
    store: Arc<dyn CredentialStore>,
    dispatcher: Arc<dyn AuthDispatcher>,
    /// Held for the duration of a refresh. Holds the rejected access token
    /// whose refresh last failed, so queued callers do not repeat it.
    refresh_lock: Mutex<Option<String>>,
}

impl ApiClient {
    /// Create a new API client. The dispatcher receives every forced sign-out.
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        dispatcher: Arc<dyn AuthDispatcher>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(config.waiting_time)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            waiting_time: config.waiting_time,
            network_policy: config.network_failure_policy,
            store,
            dispatcher,
            refresh_lock: Mutex::new(None),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Perform one authenticated call, transparently handling token expiry.
    pub async fn request(&self, req: &ApiRequest) -> Outcome {
        let Some(token) = self.load(TokenKind::Access) else {
            log::info!("No access token for {} {}, signing out", req.method, req.endpoint);
            return self.sign_out();
        };

        let response = match self.send(req, &token).await {
            Some(Attempt::Done(r)) => r,
            Some(other) => return self.resolve_failure(req, other),
            None => return self.sign_out(),
        };

        if !is_auth_rejection(response.status()) {
            return Outcome::Response(response);
        }

        log::info!(
            "{} {} rejected with {}, refreshing access token",
            req.method,
            req.endpoint,
            response.status()
        );

        match self.refresh_after_rejection(&token).await {
            Refresh::Refreshed(new_token) => match self.send(req, &new_token).await {
                Some(Attempt::Done(r)) => {
                    log::debug!("Retried {} {} -> {}", req.method, req.endpoint, r.status());
                    Outcome::Response(r)
                }
                Some(other) => self.resolve_failure(req, other),
                None => self.sign_out(),
            },
            Refresh::Rejected => {
                log::info!("Token refresh failed, clearing access token");
                if let Err(e) = self.store.delete(TokenKind::Access) {
                    log::warn!("Failed to delete access token: {}", e);
                }
                self.sign_out()
            }
            Refresh::TimedOut => {
                log::warn!("Token refresh timed out after {:?}", self.waiting_time);
                Outcome::Aborted
            }
            Refresh::Unreachable(e) => self.network_failure(req, e),
        }
    }

    /// Exchange the stored refresh token for a new access token.
    ///
    /// Returns `true` once the new access token is persisted. The refresh
    /// token itself is never rotated or deleted here.
    pub async fn refresh(&self) -> bool {
        let mut failed_for = self.refresh_lock.lock().await;
        let refreshed = matches!(self.try_refresh().await, Refresh::Refreshed(_));
        if refreshed {
            *failed_for = None;
        }
        refreshed
    }

    /// Single-flight refresh: callers queue on the lock. A caller whose
    /// rejected token has already been replaced reuses the replacement, and
    /// one whose token already failed to refresh fails without a new call.
    async fn refresh_after_rejection(&self, rejected: &str) -> Refresh {
        let mut failed_for = self.refresh_lock.lock().await;
        if let Some(current) = self.load(TokenKind::Access) {
            if current != rejected {
                log::debug!("Access token already rotated by a concurrent refresh");
                return Refresh::Refreshed(current);
            }
        }
        if failed_for.as_deref() == Some(rejected) {
            log::debug!("Refresh for this access token already failed");
            return Refresh::Rejected;
        }

        let result = self.try_refresh().await;
        *failed_for = match result {
            Refresh::Rejected => Some(rejected.to_string()),
            _ => None,
        };
        result
    }

    async fn try_refresh(&self) -> Refresh {
        let Some(refresh_token) = self.load(TokenKind::Refresh) else {
            log::info!("No refresh token stored");
            return Refresh::Rejected;
        };

        let Some(auth) = bearer(&refresh_token) else {
            log::warn!("Stored refresh token is not a valid header value");
            return Refresh::Rejected;
        };

        let request = self
            .client
            .post(self.url(REFRESH_ENDPOINT))
            .header(AUTHORIZATION, auth)
            .send();

        let response = match tokio::time::timeout(self.waiting_time, request).await {
            Err(_) => return Refresh::TimedOut,
            Ok(Err(e)) if e.is_timeout() => return Refresh::TimedOut,
            Ok(Err(e)) => return Refresh::Unreachable(e),
            Ok(Ok(r)) => r,
        };

        if !response.status().is_success() {
            log::warn!("Refresh rejected with status {}", response.status());
            return Refresh::Rejected;
        }

        let body: RefreshResponse = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Failed to parse refresh response: {}", e);
                return Refresh::Rejected;
            }
        };

        let Some(access_token) = body.access_token.filter(|t| !t.is_empty()) else {
            log::warn!("Refresh response carried no access_token");
            return Refresh::Rejected;
        };

        if let Err(e) = self.store.set(TokenKind::Access, &access_token) {
            log::error!("Failed to persist refreshed access token: {}", e);
            return Refresh::Rejected;
        }

        log::info!("Access token refreshed");
        Refresh::Refreshed(access_token)
    }

    /// Issue the request once under the waiting time.
    ///
    /// Returns `None` if the token cannot be encoded as a header value.
    async fn send(&self, req: &ApiRequest, token: &str) -> Option<Attempt> {
        let Some(auth) = bearer(token) else {
            log::warn!("Stored access token is not a valid header value");
            return None;
        };

        let mut headers = req.headers.clone();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = self
            .client
            .request(req.method.clone(), self.url(&req.endpoint))
            .headers(headers);

        builder = match &req.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let attempt = match tokio::time::timeout(self.waiting_time, builder.send()).await {
            Err(_) => Attempt::TimedOut,
            Ok(Err(e)) if e.is_timeout() => Attempt::TimedOut,
            Ok(Err(e)) => Attempt::Failed(e),
            Ok(Ok(r)) => Attempt::Done(r),
        };
        Some(attempt)
    }

    fn resolve_failure(&self, req: &ApiRequest, attempt: Attempt) -> Outcome {
        match attempt {
            Attempt::Done(r) => Outcome::Response(r),
            Attempt::TimedOut => {
                log::warn!(
                    "{} {} aborted after {:?}",
                    req.method,
                    req.endpoint,
                    self.waiting_time
                );
                Outcome::Aborted
            }
            Attempt::Failed(e) => self.network_failure(req, e),
        }
    }

    fn network_failure(&self, req: &ApiRequest, err: reqwest::Error) -> Outcome {
        match self.network_policy {
            NetworkFailurePolicy::Report => {
                log::warn!("{} {} failed: {}", req.method, req.endpoint, err);
                Outcome::Unreachable(err)
            }
            NetworkFailurePolicy::SignOut => {
                log::error!(
                    "{} {} failed, signing out: {}",
                    req.method,
                    req.endpoint,
                    err
                );
                self.sign_out()
            }
        }
    }

    fn sign_out(&self) -> Outcome {
        self.dispatcher.dispatch(AuthAction::SignOut);
        Outcome::SignedOut
    }

    fn load(&self, kind: TokenKind) -> Option<String> {
        match self.store.get(kind) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                log::warn!("Failed to read {}: {}", kind.key(), e);
                None
            }
        }
    }
}
