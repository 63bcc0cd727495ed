//! Authorized JSON requests against Google REST APIs.

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use url::Url;

use crate::auth::AccessTokenProvider;
use crate::error::{ServiceError, ServiceResult};

/// Google error reasons that mean "slow down" even on a 403.
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

/// Map a non-success status and its body onto the failure taxonomy.
pub fn classify(service: &'static str, status: u16, body: &str) -> ServiceError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let error = envelope.error.unwrap_or_default();
    let rate_reason = error
        .errors
        .iter()
        .filter_map(|e| e.reason.as_deref())
        .any(|r| RATE_LIMIT_REASONS.contains(&r));
    let message = error.message.unwrap_or_else(|| body.trim().to_string());

    match status {
        429 => ServiceError::RateLimited { service, message },
        403 if rate_reason => ServiceError::RateLimited { service, message },
        500..=599 => ServiceError::Server {
            service,
            status,
            message,
        },
        _ => ServiceError::Client {
            service,
            status,
            message,
        },
    }
}

pub struct GoogleApi {
    service: &'static str,
    http: Client,
    tokens: Rc<dyn AccessTokenProvider>,
}

impl GoogleApi {
    pub fn new(service: &'static str, tokens: Rc<dyn AccessTokenProvider>) -> Self {
        Self {
            service,
            http: Client::new(),
            tokens,
        }
    }

    fn bearer(&self) -> ServiceResult<String> {
        self.tokens
            .access_token()
            .map_err(|e| ServiceError::Auth {
                service: self.service,
                message: format!("{e:#}"),
            })
    }

    fn transport(&self, source: reqwest::Error) -> ServiceError {
        ServiceError::Transport {
            service: self.service,
            source,
        }
    }

    fn read_json<T: DeserializeOwned>(&self, resp: Response) -> ServiceResult<T> {
        let status = resp.status();
        let body = resp.text().map_err(|e| self.transport(e))?;
        if !status.is_success() {
            return Err(classify(self.service, status.as_u16(), &body));
        }
        serde_json::from_str(&body).map_err(|e| ServiceError::Decode {
            service: self.service,
            message: e.to_string(),
        })
    }

    pub fn get_json<T: DeserializeOwned>(&self, url: Url) -> ServiceResult<T> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.bearer()?)
            .send()
            .map_err(|e| self.transport(e))?;
        self.read_json(resp)
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(&self, url: Url, body: &B) -> ServiceResult<T> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.bearer()?)
            .json(body)
            .send()
            .map_err(|e| self.transport(e))?;
        self.read_json(resp)
    }
}
