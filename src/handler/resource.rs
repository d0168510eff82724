//! `POST /resource`: on-demand camera snapshots.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::error::HapStatus;
use crate::http::Response;
use crate::model::{Accessory, STANDALONE_AID};

use super::SnapshotRegistry;

/// `/resource` snapshot calls are bounded to 9 seconds; past that it is
/// treated the same as any other communication failure.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(9);

#[derive(Deserialize)]
struct ResourceRequest {
    aid: Option<u64>,
    #[serde(rename = "resource-type")]
    resource_type: String,
    #[serde(rename = "image-width")]
    image_width: u32,
    #[serde(rename = "image-height")]
    image_height: u32,
}

fn status_response(status: HapStatus) -> Response {
    let body = serde_json::to_vec(&json!({ "status": i32::from(status) })).unwrap_or_default();
    Response::json(200, "OK", body)
}

/// Handles `POST /resource`. Resolves the target accessory (the
/// standalone accessory if `aid` is omitted), invokes its registered
/// snapshot capability under a 9-second deadline, and returns the JPEG
/// bytes directly as the response body.
pub async fn handle(accessories: &[Accessory], capabilities: &SnapshotRegistry, body: &[u8]) -> Response {
    let request: ResourceRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(_) => return status_response(HapStatus::InvalidValue),
    };
    if request.resource_type != "image" {
        return status_response(HapStatus::InvalidValue);
    }

    let aid = request.aid.unwrap_or(STANDALONE_AID);
    if !accessories.iter().any(|a| a.aid == aid) {
        return status_response(HapStatus::CommunicationFailure);
    }
    let Some(capability) = capabilities.get(&aid) else {
        return status_response(HapStatus::CommunicationFailure);
    };

    match tokio::time::timeout(
        SNAPSHOT_TIMEOUT,
        capability.snapshot(request.image_width, request.image_height),
    )
    .await
    {
        Ok(Ok(bytes)) => Response::image(bytes),
        Ok(Err(_)) | Err(_) => status_response(HapStatus::CommunicationFailure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::Category;
    use crate::error::HandlerError;
    use crate::model::capability::SnapshotAsync;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct StaticSnapshot;

    #[async_trait]
    impl SnapshotAsync for StaticSnapshot {
        async fn snapshot(&self, _width: u32, _height: u32) -> Result<Vec<u8>, HandlerError> {
            Ok(vec![0xFF, 0xD8, 0xFF])
        }
    }

    struct NeverResolves;

    #[async_trait]
    impl SnapshotAsync for NeverResolves {
        async fn snapshot(&self, _width: u32, _height: u32) -> Result<Vec<u8>, HandlerError> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn accessories() -> Vec<Accessory> {
        vec![Accessory::new(1, Category::IpCamera)]
    }

    #[tokio::test]
    async fn returns_jpeg_bytes_on_success() {
        let mut capabilities: SnapshotRegistry = HashMap::new();
        capabilities.insert(1, Arc::new(StaticSnapshot));
        let resp = handle(
            &accessories(),
            &capabilities,
            br#"{"resource-type":"image","image-width":640,"image-height":480}"#,
        )
        .await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type, "image/jpeg");
        assert_eq!(&resp.body[..], &[0xFF, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn reports_communication_failure_for_unknown_accessory() {
        let capabilities: SnapshotRegistry = HashMap::new();
        let resp = handle(
            &accessories(),
            &capabilities,
            br#"{"aid":99,"resource-type":"image","image-width":1,"image-height":1}"#,
        )
        .await;
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], -70402);
    }

    #[tokio::test]
    async fn reports_communication_failure_when_no_snapshot_capability_is_registered() {
        let capabilities: SnapshotRegistry = HashMap::new();
        let resp = handle(
            &accessories(),
            &capabilities,
            br#"{"resource-type":"image","image-width":1,"image-height":1}"#,
        )
        .await;
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], -70402);
    }

    #[tokio::test(start_paused = true)]
    async fn a_hung_snapshot_times_out_as_communication_failure() {
        let mut capabilities: SnapshotRegistry = HashMap::new();
        capabilities.insert(1, Arc::new(NeverResolves));
        let handle_fut = handle(
            &accessories(),
            &capabilities,
            br#"{"resource-type":"image","image-width":1,"image-height":1}"#,
        );
        tokio::pin!(handle_fut);
        tokio::time::advance(Duration::from_secs(10)).await;
        let resp = handle_fut.await;
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], -70402);
    }
}
