use async_trait::async_trait;

use super::{client::ApiClient, types::ScanRequest};
use crate::error::ScannerError;

/// Correlates an HTTP submission with the WebSocket session that will
/// receive its outcome.
pub const SESSION_HEADER: &str = "X-Socket-SessionId";

/// Out-of-band channel used to submit scans.
#[async_trait(?Send)]
pub trait ScanGateway {
    /// Resolves once the backend accepted the request for processing; the
    /// scan outcome itself arrives on the subscribed channels.
    async fn post_scan(
        &self,
        session_id: &str,
        access_token: &str,
        request: &ScanRequest,
    ) -> Result<(), ScannerError>;
}

impl ApiClient {
    pub async fn build_scan_request(
        &self,
        session_id: &str,
        access_token: &str,
        request: &ScanRequest,
    ) -> Result<reqwest::Request, ScannerError> {
        let base_url = self.resolved_base_url().await;
        self.http_client()
            .post(format!("{}/checkin/scan", base_url))
            .headers(Self::bearer_headers(access_token)?)
            .header(SESSION_HEADER, session_id)
            .json(request)
            .build()
            .map_err(|e| ScannerError::network(format!("Failed to build request: {}", e)))
    }

    pub async fn submit_scan(
        &self,
        session_id: &str,
        access_token: &str,
        request: &ScanRequest,
    ) -> Result<(), ScannerError> {
        let http_request = self
            .build_scan_request(session_id, access_token, request)
            .await?;
        let reply = self.execute(http_request).await?;
        reply.into_result().map(|_| ())
    }
}

#[async_trait(?Send)]
impl ScanGateway for ApiClient {
    async fn post_scan(
        &self,
        session_id: &str,
        access_token: &str,
        request: &ScanRequest,
    ) -> Result<(), ScannerError> {
        self.submit_scan(session_id, access_token, request).await
    }
}
