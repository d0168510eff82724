//! `POST /identify`: unauthenticated pre-pairing identification.

use serde_json::json;

use crate::error::HapStatus;
use crate::http::Response;
use crate::model::STANDALONE_AID;

use super::IdentifyRegistry;

fn status_response(status: HapStatus) -> Response {
    let body = serde_json::to_vec(&json!({ "status": i32::from(status) })).unwrap_or_default();
    Response::json(200, "OK", body)
}

/// Handles `POST /identify`. Only accepted before the accessory has any
/// paired controller; once paired, identification happens through a write
/// to the mandatory `Identify` characteristic instead of this route.
pub fn handle(paired: bool, capabilities: &IdentifyRegistry) -> Response {
    if paired {
        return status_response(HapStatus::InsufficientPrivileges);
    }
    if let Some(capability) = capabilities.get(&STANDALONE_AID) {
        capability.identify();
    }
    Response::no_content()
}
