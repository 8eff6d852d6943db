use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde_json::{json, Value};

use crate::ratelimit::RateLimiter;
use crate::record::UpdatePayload;
use crate::retry::{self, RetryAction, RetryConfig};

use super::error::{TransportError, VndbError};

pub const DEFAULT_API_BASE: &str = "https://api.vndb.org/kana/";

/// Pause before restarting a call after a secure-channel fault. This path
/// is unconditional and does not consume the bounded retry budget.
const SECURE_CHANNEL_PAUSE: Duration = Duration::from_secs(5);

/// Page size for user-list queries; the API caps at 100.
const USER_LIST_PAGE_SIZE: u32 = 100;

/// Status line and raw body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal async transport under the client.
///
/// `reqwest::Client` is the production implementation; tests substitute
/// scripted fakes so the retry and recovery paths can be exercised without
/// a network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait::async_trait]
impl Transport for reqwest::Client {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        let mut builder = self.request(method, url);
        if let Some(token) = token {
            builder = builder.header(reqwest::header::AUTHORIZATION, format!("Token {}", token));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// A search hit: canonical id plus display title. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
}

/// One entry of the user's remote list.
#[derive(Debug, Clone, PartialEq)]
pub struct UserListEntry {
    pub id: String,
    pub title: Option<String>,
}

/// Rate-limited, retrying client for the VNDB API.
///
/// Every attempt acquires a [`RateLimiter`] slot before touching the
/// network; 429 and 5xx answers are retried inside the bounded budget of
/// [`RetryConfig`]; secure-channel faults pause and restart the whole call.
pub struct VndbClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry: RetryConfig,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for VndbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VndbClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl VndbClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
        base_url: &str,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            base_url: base_url.to_string(),
            token,
        }
    }

    /// Production client over `reqwest`, honouring the configured proxy.
    pub fn over_http(
        token: &str,
        proxy: Option<&str>,
        limiter: Arc<RateLimiter>,
        retry: RetryConfig,
    ) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("vndb-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60));
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let client = builder.build()?;
        Ok(Self::new(
            Arc::new(client),
            limiter,
            retry,
            DEFAULT_API_BASE,
            Some(token.to_string()),
        ))
    }

    /// One rate-limited attempt. Retryable answers (429, 5xx, mid-exchange
    /// transport faults) come back as errors for the retry loop; anything
    /// the server answered definitively is an `Ok` response.
    async fn attempt(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, VndbError> {
        self.limiter.acquire().await;
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .transport
            .send(method.clone(), &url, body, self.token.as_deref())
            .await
            .map_err(|source| VndbError::Transport {
                source,
                path: path.to_string(),
            })?;

        match response.status {
            status if status == 429 || status >= 500 => Err(VndbError::Status {
                status,
                path: path.to_string(),
            }),
            _ => Ok(response),
        }
    }

    /// Full recovery pipeline around [`Self::attempt`]: bounded retry for
    /// server-side faults inside an unbounded pause-and-restart loop for
    /// secure-channel faults.
    async fn request(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse, VndbError> {
        loop {
            let result = retry::retry_with_backoff(
                &self.retry,
                |e: &VndbError| {
                    if e.is_retryable() {
                        RetryAction::Retry
                    } else {
                        RetryAction::Abort
                    }
                },
                || self.attempt(method, path, body),
            )
            .await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_secure_channel() => {
                    tracing::warn!(path, error = %e, "secure channel fault, pausing before restart");
                    tokio::time::sleep(SECURE_CHANNEL_PAUSE).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(VndbError::RetriesExhausted {
                        attempts: self.retry.max_retries + 1,
                        path: path.to_string(),
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read-style call: `Ok(Some(json))` on a parsed 2xx body, `Ok(None)`
    /// when the server answered without a usable result. A 400 means the
    /// query itself was unsatisfiable (e.g. a search term the parser
    /// rejects) and is a definitive no-result, never a retry.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, VndbError> {
        let response = self.request(&method, path, body).await?;

        if response.is_success() {
            return match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    tracing::debug!(path, error = %e, "2xx body was not JSON, treating as empty");
                    Ok(None)
                }
            };
        }

        if response.status == 400 {
            tracing::warn!(path, body = %response.body, "request rejected as unsatisfiable");
        } else {
            tracing::debug!(path, status = response.status, "no result");
        }
        Ok(None)
    }

    /// Search the visual-novel endpoint; top search-ranked hit or `None`.
    pub async fn search_vn(&self, query: &str) -> Result<Option<CatalogEntry>, VndbError> {
        let body = json!({
            "filters": ["search", "=", query],
            "fields": "id,title",
            "sort": "searchrank",
        });
        let Some(js) = self.call(Method::POST, "vn", Some(&body)).await? else {
            return Ok(None);
        };
        let hit = &js["results"][0];
        Ok(hit["id"].as_str().map(|id| CatalogEntry {
            id: id.to_string(),
            title: hit["title"].as_str().unwrap_or_default().to_string(),
        }))
    }

    /// Search the release endpoint and follow the indirection to the first
    /// visual novel the release belongs to.
    pub async fn search_release(&self, query: &str) -> Result<Option<CatalogEntry>, VndbError> {
        let body = json!({
            "filters": ["search", "=", query],
            "fields": "id,title,vns.id",
            "sort": "searchrank",
        });
        let Some(js) = self.call(Method::POST, "release", Some(&body)).await? else {
            return Ok(None);
        };
        let hit = &js["results"][0];
        Ok(hit["vns"][0]["id"].as_str().map(|id| CatalogEntry {
            id: id.to_string(),
            title: hit["title"].as_str().unwrap_or_default().to_string(),
        }))
    }

    /// User id of the token's owner.
    pub async fn auth_info(&self) -> Result<String, VndbError> {
        let js = self
            .call(Method::GET, "authinfo", None)
            .await?
            .ok_or_else(|| anyhow::anyhow!("authinfo returned no data"))?;
        js["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| VndbError::Other(anyhow::anyhow!("authinfo response missing user id")))
    }

    /// Fetch the user's whole list, following pagination. `with_titles`
    /// requests the visual-novel titles as well (for list export); the
    /// id-only form is enough for duplicate pre-filtering.
    pub async fn user_list(
        &self,
        user_id: &str,
        with_titles: bool,
    ) -> Result<Vec<UserListEntry>, VndbError> {
        let fields = if with_titles {
            "id, vn.title, vn.titles.title, vn.titles.main"
        } else {
            "id"
        };

        let mut entries = Vec::new();
        let mut page = 1u32;
        loop {
            let body = json!({
                "user": user_id,
                "fields": fields,
                "sort": "vote",
                "results": USER_LIST_PAGE_SIZE,
                "page": page,
            });
            let js = self
                .call(Method::POST, "ulist", Some(&body))
                .await?
                .ok_or_else(|| anyhow::anyhow!("user list query for page {} returned no data", page))?;

            if let Some(results) = js["results"].as_array() {
                for item in results {
                    let Some(id) = item["id"].as_str() else {
                        continue;
                    };
                    entries.push(UserListEntry {
                        id: id.to_string(),
                        title: main_title(&item["vn"]),
                    });
                }
            }

            if !js["more"].as_bool().unwrap_or(false) {
                break;
            }
            page += 1;
        }
        Ok(entries)
    }

    /// Apply a labeled-status update to the user's list entry.
    ///
    /// Acceptance is the 2xx status alone; the body is ignored. Any other
    /// definitive answer is a rejection for the caller to record.
    pub async fn patch_user_entry(&self, payload: &UpdatePayload) -> Result<(), VndbError> {
        let path = format!("ulist/{}", payload.vn_id);
        let response = self
            .request(&Method::PATCH, &path, Some(&payload.body()))
            .await?;
        if response.is_success() {
            Ok(())
        } else {
            Err(VndbError::Rejected {
                status: response.status,
                path,
                body: response.body,
            })
        }
    }
}

/// Preferred display title of a `vn` object: the entry of `titles[]` marked
/// as main, falling back to the plain `title` field.
fn main_title(vn: &Value) -> Option<String> {
    if let Some(titles) = vn["titles"].as_array() {
        for entry in titles {
            if entry["main"].as_bool() == Some(true) {
                if let Some(title) = entry["title"].as_str() {
                    return Some(title.to_string());
                }
            }
        }
    }
    vn["title"].as_str().map(str::to_string)
}
