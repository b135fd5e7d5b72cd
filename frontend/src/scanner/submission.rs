use chrono::NaiveDate;

use super::{classifier::AttendeeIdentity, dedupe::DuplicateCache};
use crate::{
    api::ScanRequest, error::ScannerError, realtime::ConnectionManager, utils::time::today_local,
};

/// Builds scan requests and hands them to the connection manager, holding
/// the payload in the duplicate cache while the request is out.
#[derive(Clone)]
pub struct ScanSubmissionService {
    connection: ConnectionManager,
    cache: DuplicateCache,
}

impl ScanSubmissionService {
    pub fn new(connection: ConnectionManager, cache: DuplicateCache) -> Self {
        Self { connection, cache }
    }

    pub async fn submit(
        &self,
        raw_payload: &str,
        identity: &AttendeeIdentity,
        scanner_id: i64,
        device_id: &str,
    ) -> Result<ScanRequest, ScannerError> {
        self.submit_on(raw_payload, identity, scanner_id, device_id, today_local())
            .await
    }

    pub async fn submit_on(
        &self,
        raw_payload: &str,
        identity: &AttendeeIdentity,
        scanner_id: i64,
        device_id: &str,
        scan_date: NaiveDate,
    ) -> Result<ScanRequest, ScannerError> {
        let request = ScanRequest::new(raw_payload, identity, scanner_id, device_id, scan_date);
        self.cache.add(raw_payload);
        if let Err(err) = self.connection.send_scan_request(&request).await {
            self.cache.remove(raw_payload);
            log::warn!("scan for attendee {} not sent: {}", identity.attendee_id, err);
            return Err(err);
        }
        log::info!("scan for attendee {} submitted", identity.attendee_id);
        Ok(request)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::test_support::pipeline::{badge, identity, Pipeline};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn successful_submit_keeps_payload_cached() {
        let pipeline = Pipeline::new();
        pipeline.connect().await;
        let cache = DuplicateCache::new();
        let service = ScanSubmissionService::new(pipeline.manager.clone(), cache.clone());

        let payload = badge(42);
        let request = service
            .submit_on(&payload, &identity(42), 7, "device-1", date())
            .await
            .unwrap();
        assert_eq!(request.attendee_id, 42);
        assert_eq!(request.scanner_id, 7);
        assert_eq!(request.raw_payload, payload);
        assert_eq!(request.scan_date, date());
        assert!(cache.has(&payload));
        assert_eq!(pipeline.gateway.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_send_reopens_payload() {
        let pipeline = Pipeline::new();
        let cache = DuplicateCache::new();
        let service = ScanSubmissionService::new(pipeline.manager.clone(), cache.clone());

        let payload = badge(42);
        let err = service
            .submit_on(&payload, &identity(42), 7, "device-1", date())
            .await
            .unwrap_err();
        assert_eq!(err, ScannerError::NotConnected);
        assert!(!cache.has(&payload));

        pipeline.connect().await;
        pipeline
            .gateway
            .push_result(Err(ScannerError::network("timeout")));
        assert!(service
            .submit_on(&payload, &identity(42), 7, "device-1", date())
            .await
            .is_err());
        assert!(cache.is_empty());

        service
            .submit_on(&payload, &identity(42), 7, "device-1", date())
            .await
            .unwrap();
        assert!(cache.has(&payload));
    }
}
