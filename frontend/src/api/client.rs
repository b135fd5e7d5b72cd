use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, StatusCode,
};

use crate::{api::types::ApiError, config, error::ScannerError};

#[cfg(test)]
use std::{cell::RefCell, sync::Arc};

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Option<String>,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    fn api_error(&self) -> Option<ApiError> {
        serde_json::from_str::<ApiError>(&self.body).ok()
    }

    /// Maps non-success statuses onto scanner errors; returns the body otherwise.
    pub fn into_result(self) -> Result<String, ScannerError> {
        if self.status.is_success() {
            return Ok(self.body);
        }
        let message = self.api_error().map(|e| e.error).unwrap_or_else(|| {
            self.status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
        if self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN {
            Err(ScannerError::Authentication(message))
        } else {
            Err(ScannerError::ServerRejection(message))
        }
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: None,
        }
    }

    pub fn new_with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: Some(base_url.into()),
        }
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    pub(crate) async fn resolved_base_url(&self) -> String {
        if let Some(base) = &self.base_url {
            base.clone()
        } else {
            config::await_api_base_url().await
        }
    }

    pub(crate) fn bearer_headers(access_token: &str) -> Result<HeaderMap, ScannerError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| ScannerError::Authentication("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    pub(crate) async fn execute(&self, request: reqwest::Request) -> Result<HttpReply, ScannerError> {
        #[cfg(test)]
        if let Some(responder) = find_mock(request.url().as_str()) {
            let mock = responder
                .respond(&request)
                .map_err(|e| ScannerError::network(e.error))?;
            return Ok(HttpReply {
                status: StatusCode::from_u16(mock.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body: mock.body.to_string(),
            });
        }

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| ScannerError::network(format!("Request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ScannerError::network(format!("Failed to read response: {}", e)))?;
        Ok(HttpReply { status, body })
    }
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[cfg(test)]
impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }
}

/// Answers requests whose URL starts with a registered base URL.
#[cfg(test)]
pub trait TestResponder {
    fn respond(&self, request: &reqwest::Request) -> Result<MockResponse, ApiError>;
}

#[cfg(test)]
thread_local! {
    static MOCKS: RefCell<Vec<(String, Arc<dyn TestResponder>)>> = RefCell::new(Vec::new());
}

#[cfg(test)]
pub fn register_mock(base_url: String, responder: Arc<dyn TestResponder>) {
    MOCKS.with(|mocks| {
        let mut mocks = mocks.borrow_mut();
        mocks.retain(|(base, _)| *base != base_url);
        mocks.push((base_url, responder));
    });
}

#[cfg(test)]
fn find_mock(url: &str) -> Option<Arc<dyn TestResponder>> {
    MOCKS.with(|mocks| {
        mocks
            .borrow()
            .iter()
            .filter(|(base, _)| url.starts_with(base.as_str()))
            .max_by_key(|(base, _)| base.len())
            .map(|(_, responder)| responder.clone())
    })
}
