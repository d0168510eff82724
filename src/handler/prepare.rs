//! `PUT /prepare`: per-connection timed-write reservations.
//!
//! A prepared write is one-shot: consuming it (whether or not the TTL has
//! expired) removes it, so a replayed `pid` never succeeds twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use crate::error::HapStatus;
use crate::http::Response;

#[derive(Debug, Default)]
pub struct PreparedWrites {
    deadlines: HashMap<i64, Instant>,
}

impl PreparedWrites {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pid` with a deadline `ttl_ms` from now, overwriting any
    /// earlier reservation under the same `pid`. Returns the `status`
    /// value the response body should carry.
    pub fn reserve(&mut self, pid: i64, ttl_ms: i64) -> i32 {
        if ttl_ms <= 0 {
            return HapStatus::InvalidValue.into();
        }
        self.deadlines
            .insert(pid, Instant::now() + Duration::from_millis(ttl_ms as u64));
        HapStatus::Success.into()
    }

    /// One-shot lookup: removes `pid` unconditionally and reports whether
    /// it existed and had not yet expired.
    pub fn consume(&mut self, pid: i64) -> bool {
        match self.deadlines.remove(&pid) {
            Some(deadline) => Instant::now() <= deadline,
            None => false,
        }
    }
}

#[derive(Deserialize)]
struct PrepareBody {
    pid: i64,
    ttl: Option<i64>,
}

/// Handles one `PUT /prepare` body.
#[must_use]
pub fn handle(prepared: &mut PreparedWrites, body: &[u8]) -> Response {
    let parsed: PrepareBody = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(_) => {
            let body = serde_json::to_vec(&json!({ "status": i32::from(HapStatus::InvalidValue) }))
                .unwrap_or_default();
            return Response::json(200, "OK", body);
        }
    };

    let status = match parsed.ttl {
        Some(ttl) => prepared.reserve(parsed.pid, ttl),
        None => HapStatus::InvalidValue.into(),
    };
    let body = serde_json::to_vec(&json!({ "status": status })).unwrap_or_default();
    Response::json(200, "OK", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_a_positive_ttl() {
        let mut prepared = PreparedWrites::new();
        let resp = handle(&mut prepared, br#"{"pid":123,"ttl":5000}"#);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], 0);
        assert!(prepared.consume(123));
    }

    #[test]
    fn rejects_non_positive_ttl() {
        let mut prepared = PreparedWrites::new();
        let resp = handle(&mut prepared, br#"{"pid":1,"ttl":0}"#);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], -70410);
    }

    #[test]
    fn rejects_missing_ttl() {
        let mut prepared = PreparedWrites::new();
        let resp = handle(&mut prepared, br#"{"pid":1}"#);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["status"], -70410);
    }

    #[test]
    fn consuming_is_one_shot() {
        let mut prepared = PreparedWrites::new();
        prepared.reserve(7, 1000);
        assert!(prepared.consume(7));
        assert!(!prepared.consume(7));
    }

    #[test]
    fn a_later_prepare_overwrites_the_same_pid() {
        let mut prepared = PreparedWrites::new();
        prepared.reserve(7, 1);
        std::thread::sleep(Duration::from_millis(5));
        prepared.reserve(7, 5000);
        assert!(prepared.consume(7));
    }
}
