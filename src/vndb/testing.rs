//! Scripted transport for exercising the client stack without a network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use crate::ratelimit::RateLimiter;
use crate::retry::RetryConfig;

use super::client::{RawResponse, Transport, VndbClient};
use super::error::TransportError;

/// One request as seen by the transport.
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
    pub token: Option<String>,
}

type Handler = Box<dyn Fn(&SentRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync>;

/// Transport whose replies come from a closure of (request, call index).
pub(crate) struct ScriptedTransport {
    handler: Handler,
    log: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        handler: impl Fn(&SentRequest, usize) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Every request sent so far, in order.
    pub fn requests(&self) -> Vec<SentRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.log.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<RawResponse, TransportError> {
        let request = SentRequest {
            method,
            url: url.to_string(),
            body: body.cloned(),
            token: token.map(str::to_string),
        };
        let index = {
            let mut log = self.log.lock().unwrap();
            log.push(request.clone());
            log.len() - 1
        };
        (self.handler)(&request, index)
    }
}

pub(crate) fn reply_json(value: Value) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: 200,
        body: value.to_string(),
    })
}

pub(crate) fn reply_status(status: u16, body: &str) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status,
        body: body.to_string(),
    })
}

/// Limiter generous enough that tests never wait on it.
pub(crate) fn unbounded_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(1_000_000, Duration::from_secs(1)))
}

/// Client with an empty base url (request paths double as full urls),
/// zero-delay retries and a fixed test token.
pub(crate) fn test_client(transport: Arc<ScriptedTransport>) -> VndbClient {
    VndbClient::new(
        transport,
        unbounded_limiter(),
        RetryConfig {
            max_retries: 5,
            base_delay_secs: 0,
            max_delay_secs: 0,
        },
        "",
        Some("secret".to_string()),
    )
}
