//! HTTP platform client.
//!
//! Talks to a cookie-session REST platform whose endpoint paths come from
//! `PlatformConfig`. Each `HttpPlatform` owns its own token jar; the jar is
//! sent as a `Cookie` header and refreshed from every `Set-Cookie` response.
//! This client never retries on its own: the orchestrator's retry policy
//! decides that from the returned `PlatformError`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::models::{PostResult, PostSummary, Profile};
use super::platform::{Platform, PlatformConnector};
use super::PlatformError;
use crate::auth::SessionToken;
use crate::config::PlatformConfig;

#[derive(Debug)]
struct Endpoints {
    login: Url,
    identity: Url,
    post: Url,
    timeline: Url,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

/// Builds `HttpPlatform` clients that share one connection pool.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpConnector {
    client: Client,
    endpoints: Arc<Endpoints>,
    config: Arc<PlatformConfig>,
}

impl HttpConnector {
    pub fn new(config: PlatformConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            anyhow::bail!("platform.base_url is not configured");
        }
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid platform base URL: {}", config.base_url))?;
        let join = |path: &str| {
            base.join(path)
                .with_context(|| format!("Invalid platform endpoint path: {}", path))
        };
        let endpoints = Endpoints {
            login: join(&config.login_path)?,
            identity: join(&config.identity_path)?,
            post: join(&config.post_path)?,
            timeline: join(&config.timeline_path)?,
        };

        let mut builder = Client::builder().timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(ref agent) = config.user_agent {
            builder = builder.user_agent(agent.clone());
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoints: Arc::new(endpoints),
            config: Arc::new(config),
        })
    }
}

impl PlatformConnector for HttpConnector {
    fn connect(&self) -> Box<dyn Platform> {
        Box::new(HttpPlatform {
            client: self.client.clone(), // Cheap clone, shares connection pool
            endpoints: self.endpoints.clone(),
            config: self.config.clone(),
            jar: Mutex::new(Vec::new()),
        })
    }
}

/// One platform session: a shared HTTP client plus a private token jar.
pub struct HttpPlatform {
    client: Client,
    endpoints: Arc<Endpoints>,
    config: Arc<PlatformConfig>,
    jar: Mutex<Vec<SessionToken>>,
}

fn domain_matches(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    host.eq_ignore_ascii_case(domain)
        || (host.len() > domain.len()
            && host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase())))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.len() == cookie_path.len()
            || request_path[cookie_path.len()..].starts_with('/'))
}

impl HttpPlatform {
    /// Headers carrying the jar's tokens that apply to `url`.
    async fn session_headers(&self, url: &Url) -> Result<header::HeaderMap, PlatformError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        if let Some(ref token) = self.config.bearer_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| PlatformError::InvalidResponse(format!("invalid bearer token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let host = url.host_str().unwrap_or_default();
        let now = Utc::now();
        let jar = self.jar.lock().await;
        let applicable: Vec<&SessionToken> = jar
            .iter()
            .filter(|t| !t.is_expired_at(now))
            .filter(|t| t.domain.is_empty() || domain_matches(host, &t.domain))
            .filter(|t| path_matches(url.path(), &t.path))
            .filter(|t| !(t.secure == Some(true) && url.scheme() != "https" && host != "127.0.0.1" && host != "localhost"))
            .collect();

        if !applicable.is_empty() {
            let cookie = applicable
                .iter()
                .map(|t| format!("{}={}", t.name, t.value))
                .collect::<Vec<_>>()
                .join("; ");
            let value = header::HeaderValue::from_str(&cookie)
                .map_err(|e| PlatformError::InvalidResponse(format!("invalid session token: {}", e)))?;
            headers.insert(header::COOKIE, value);
        }

        if let Some(ref csrf_cookie) = self.config.csrf_cookie {
            if let Some(token) = applicable.iter().find(|t| &t.name == csrf_cookie) {
                if let (Ok(name), Ok(value)) = (
                    header::HeaderName::from_bytes(self.config.csrf_header.as_bytes()),
                    header::HeaderValue::from_str(&token.value),
                ) {
                    headers.insert(name, value);
                }
            }
        }

        Ok(headers)
    }

    /// Fold `Set-Cookie` headers from a response into the jar.
    async fn absorb_cookies(&self, response: &Response) {
        let host = response.url().host_str().unwrap_or_default().to_string();
        let now = Utc::now();
        let mut jar = self.jar.lock().await;

        for cookie in response.cookies() {
            let expiry: Option<DateTime<Utc>> = match (cookie.max_age(), cookie.expires()) {
                (Some(max_age), _) => chrono::Duration::from_std(max_age).ok().map(|d| now + d),
                (None, Some(at)) => Some(DateTime::<Utc>::from(at)),
                (None, None) => None,
            };
            let token = SessionToken {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
                domain: cookie.domain().map(str::to_string).unwrap_or_else(|| host.clone()),
                path: cookie.path().unwrap_or("/").to_string(),
                expiry,
                secure: Some(cookie.secure()),
                http_only: Some(cookie.http_only()),
            };

            jar.retain(|existing| !existing.same_slot(&token));
            // Expired or zero max-age means the server deleted the cookie.
            let deleted = cookie.max_age() == Some(Duration::ZERO)
                || cookie.expires().map(|at| at <= SystemTime::now()).unwrap_or(false);
            if deleted {
                debug!(name = %token.name, "Session token removed by server");
            } else {
                jar.push(token);
            }
        }
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, PlatformError> {
        let headers = self.session_headers(url).await?;
        let response = request.headers(headers).send().await?;
        self.absorb_cookies(&response).await;
        Ok(response)
    }

    fn retry_after(response: &Response) -> Option<Duration> {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, PlatformError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let retry_after = Self::retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            Err(PlatformError::from_status(status, &body, retry_after))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, PlatformError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            PlatformError::InvalidResponse(format!(
                "{}: {}",
                e,
                PlatformError::truncate_body(&text)
            ))
        })
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn set_session_tokens(&self, tokens: Vec<SessionToken>) {
        *self.jar.lock().await = tokens;
    }

    async fn session_tokens(&self) -> Vec<SessionToken> {
        self.jar.lock().await.clone()
    }

    async fn clear_session_tokens(&self) {
        self.jar.lock().await.clear();
    }

    async fn login(&self, username: &str, password: &str, email: Option<&str>) -> Result<(), PlatformError> {
        let url = &self.endpoints.login;
        let mut form = vec![("username", username), ("password", password)];
        if let Some(email) = email {
            form.push(("email", email));
        }

        let request = self.client.post(url.clone()).form(&form);
        let response = self.send(request, url).await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(PlatformError::CredentialsRejected(PlatformError::truncate_body(&body)))
            }
            _ => Self::check_response(response).await.map(|_| ()),
        }
    }

    async fn current_identity(&self) -> Result<Option<Profile>, PlatformError> {
        let url = &self.endpoints.identity;
        let request = self.client.get(url.clone());
        let response = self.send(request, url).await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => {
                let response = Self::check_response(response).await?;
                Self::parse_json(response).await.map(Some)
            }
        }
    }

    async fn submit_message(&self, text: &str, reply_to: Option<&str>) -> Result<PostResult, PlatformError> {
        let url = &self.endpoints.post;
        let request = self.client.post(url.clone()).json(&SubmitBody { text, reply_to });
        let response = self.send(request, url).await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response).await
    }

    async fn recent_messages(&self, handle: &str, count: usize) -> Result<Vec<PostSummary>, PlatformError> {
        let url = &self.endpoints.timeline;
        let count_param = count.to_string();
        let request = self
            .client
            .get(url.clone())
            .query(&[("handle", handle), ("count", count_param.as_str())]);
        let response = self.send(request, url).await?;
        let response = Self::check_response(response).await?;
        let posts: Vec<PostSummary> = Self::parse_json(response).await?;
        if posts.len() > count {
            warn!(requested = count, returned = posts.len(), "Platform returned more posts than requested");
        }
        Ok(posts.into_iter().take(count).collect())
    }
}
