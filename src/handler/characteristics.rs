//! `GET`/`PUT /characteristics`.

use std::collections::HashSet;
use std::net::SocketAddr;

use serde::Deserialize;
use serde_json::{json, Value as Json};

use crate::error::HapStatus;
use crate::events::{EventBus, Topic};
use crate::http::Response;
use crate::model::json::CharacteristicResult;
use crate::model::{catalog, json as model_json, Accessory, Format, Perms, Value};

use super::prepare::PreparedWrites;
use super::IdentifyRegistry;

/// Renders one `{aid, iid, status?, value?}` entry, the common shape shared
/// by a `/characteristics` read or write result.
fn characteristic_result_json(aid: u64, iid: u64, status: Option<HapStatus>, value: Option<Json>) -> Json {
    serde_json::to_value(CharacteristicResult {
        aid,
        iid,
        status: status.map(i32::from),
        value,
    })
    .unwrap_or_default()
}

fn locate(accessories: &[Accessory], aid: u64, iid: u64) -> Option<(usize, usize, usize)> {
    let acc_index = accessories.iter().position(|a| a.aid == aid)?;
    let (service_index, char_index) = accessories[acc_index].locate(iid)?;
    Some((acc_index, service_index, char_index))
}

#[derive(Default)]
struct QueryOptions {
    meta: bool,
    perms: bool,
    type_: bool,
    ev: bool,
}

fn parse_query(query: &str) -> (Vec<(u64, u64)>, QueryOptions) {
    let mut ids = Vec::new();
    let mut opts = QueryOptions::default();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "id" => {
                for id in value.split(',') {
                    if let Some((aid, iid)) = id.split_once('.') {
                        if let (Ok(aid), Ok(iid)) = (aid.parse(), iid.parse()) {
                            ids.push((aid, iid));
                        }
                    }
                }
            }
            "meta" => opts.meta = value == "1",
            "perms" => opts.perms = value == "1",
            "type" => opts.type_ = value == "1",
            "ev" => opts.ev = value == "1",
            _ => {}
        }
    }
    (ids, opts)
}

/// Handles `GET /characteristics?id=aid.iid,…`. `subscriptions` is this
/// connection's own subscribed topics, consulted only when `&ev=1` asks
/// for each entry's current notify state.
#[must_use]
pub fn get(accessories: &[Accessory], query: &str, subscriptions: &HashSet<Topic>) -> Response {
    let (ids, opts) = parse_query(query);
    let mut entries = Vec::with_capacity(ids.len());
    let mut any_failed = false;

    for (aid, iid) in ids {
        match locate(accessories, aid, iid) {
            None => {
                any_failed = true;
                entries.push(characteristic_result_json(aid, iid, Some(HapStatus::NotFound), None));
            }
            Some((acc_index, service_index, char_index)) => {
                let characteristic =
                    &accessories[acc_index].services()[service_index].characteristics()[char_index];
                match characteristic.read() {
                    Err(_) => {
                        any_failed = true;
                        entries.push(characteristic_result_json(aid, iid, Some(HapStatus::WriteOnly), None));
                    }
                    Ok(value) if !(opts.meta || opts.perms || opts.type_ || opts.ev) => {
                        entries.push(characteristic_result_json(aid, iid, None, Some(value.to_json())));
                    }
                    Ok(value) => {
                        let mut obj = serde_json::Map::new();
                        obj.insert("aid".into(), json!(aid));
                        obj.insert("iid".into(), json!(iid));
                        obj.insert("value".into(), value.to_json());
                        if opts.meta {
                            let c = &characteristic.constraints;
                            if let Some(unit) = &c.unit {
                                obj.insert("unit".into(), json!(unit));
                            }
                            if let Some(min) = c.min_value {
                                obj.insert("minValue".into(), json!(min));
                            }
                            if let Some(max) = c.max_value {
                                obj.insert("maxValue".into(), json!(max));
                            }
                            if let Some(step) = c.min_step {
                                obj.insert("minStep".into(), json!(step));
                            }
                            if let Some(max_len) = c.max_len {
                                obj.insert("maxLen".into(), json!(max_len));
                            }
                        }
                        if opts.perms {
                            obj.insert("perms".into(), json!(characteristic.perms.to_hap_tokens()));
                        }
                        if opts.type_ {
                            obj.insert("type".into(), json!(model_json::render_type(characteristic.type_id)));
                        }
                        if opts.ev {
                            obj.insert("ev".into(), json!(subscriptions.contains(&(aid, iid))));
                        }
                        entries.push(Json::Object(obj));
                    }
                }
            }
        }
    }

    if any_failed {
        for entry in &mut entries {
            if let Json::Object(obj) = entry {
                obj.entry("status").or_insert_with(|| json!(i32::from(HapStatus::Success)));
            }
        }
    }

    let body = serde_json::to_vec(&json!({ "characteristics": entries })).unwrap_or_default();
    if any_failed {
        Response::json(207, "Multi-Status", body)
    } else {
        Response::json(200, "OK", body)
    }
}

#[derive(Deserialize)]
struct PutEntry {
    aid: u64,
    iid: u64,
    value: Option<Json>,
    ev: Option<bool>,
    #[serde(rename = "authData")]
    #[allow(dead_code)]
    auth_data: Option<String>,
    #[allow(dead_code)]
    remote: Option<bool>,
    r: Option<bool>,
}

#[derive(Deserialize)]
struct PutBody {
    characteristics: Vec<PutEntry>,
    pid: Option<i64>,
}

fn json_to_value(format: Format, raw: &Json) -> Result<Value, ()> {
    match format {
        Format::Bool => raw.as_bool().map(Value::Bool).ok_or(()),
        Format::Int | Format::UInt8 | Format::UInt16 | Format::UInt32 | Format::UInt64 => {
            raw.as_i64().map(Value::Int).ok_or(())
        }
        Format::Float => raw.as_f64().map(Value::Float).ok_or(()),
        Format::String => raw.as_str().map(|s| Value::String(s.to_string())).ok_or(()),
        Format::Data | Format::Tlv8 => raw
            .as_str()
            .and_then(|s| base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s).ok())
            .map(Value::Data)
            .ok_or(()),
        Format::Array | Format::Dictionary => Err(()),
    }
}

/// Applies one `{aid, iid, value?, ev?, r?}` entry: toggles the
/// subscription if `ev` is present, then validates and writes `value` if
/// present, emitting an event to every other subscriber. Returns the
/// value to echo back when `r` asked for a write-response.
fn apply_entry(
    accessories: &mut [Accessory],
    entry: &PutEntry,
    event_bus: &EventBus,
    sender: SocketAddr,
    subscriptions: &mut HashSet<Topic>,
    identify_capabilities: &IdentifyRegistry,
) -> Result<Option<Json>, HapStatus> {
    let (acc_index, service_index, char_index) =
        locate(accessories, entry.aid, entry.iid).ok_or(HapStatus::NotFound)?;

    if let Some(ev) = entry.ev {
        let topic = (entry.aid, entry.iid);
        if ev {
            event_bus.subscribe(sender, topic);
            subscriptions.insert(topic);
        } else {
            event_bus.unsubscribe(sender, topic);
            subscriptions.remove(&topic);
        }
    }

    let mut echoed = None;
    if let Some(raw_value) = &entry.value {
        let characteristic = accessories[acc_index]
            .characteristic_mut(service_index, char_index)
            .expect("locate() guarantees the characteristic exists");
        if !characteristic.perms.contains(Perms::WRITE) {
            return Err(HapStatus::ReadOnly);
        }
        let is_identify_write = characteristic.type_id == catalog::identify_type_id();
        let value = json_to_value(characteristic.format, raw_value).map_err(|_| HapStatus::InvalidValue)?;
        characteristic
            .set_value(value.clone())
            .map_err(|_| HapStatus::InvalidValue)?;
        let is_identify_write = is_identify_write && value == Value::Bool(true);

        if is_identify_write {
            if let Some(capability) = identify_capabilities.get(&entry.aid) {
                capability.identify();
            }
        }

        let value_json = value.to_json();
        if entry.r.unwrap_or(false) && characteristic.perms.contains(Perms::WRITE_RESPONSE) {
            echoed = Some(value_json.clone());
        }
        event_bus.publish((entry.aid, entry.iid), value_json, Some(sender));
    }

    Ok(echoed)
}

/// Handles `PUT /characteristics`.
#[must_use]
pub fn put(
    accessories: &mut [Accessory],
    body: &[u8],
    prepared: &mut PreparedWrites,
    event_bus: &EventBus,
    sender: SocketAddr,
    subscriptions: &mut HashSet<Topic>,
    identify_capabilities: &IdentifyRegistry,
) -> Response {
    let put_body: PutBody = match serde_json::from_slice(body) {
        Ok(b) => b,
        Err(_) => return Response::empty_status(400, "Bad Request"),
    };

    let pid_expired = matches!(put_body.pid, Some(pid) if !prepared.consume(pid));

    let mut results = Vec::with_capacity(put_body.characteristics.len());
    let mut any_failed = pid_expired;

    for entry in &put_body.characteristics {
        if pid_expired {
            results.push(characteristic_result_json(entry.aid, entry.iid, Some(HapStatus::InvalidValue), None));
            continue;
        }
        match apply_entry(accessories, entry, event_bus, sender, subscriptions, identify_capabilities) {
            Ok(echoed) => {
                results.push(characteristic_result_json(entry.aid, entry.iid, None, echoed));
            }
            Err(status) => {
                any_failed = true;
                results.push(characteristic_result_json(entry.aid, entry.iid, Some(status), None));
            }
        }
    }

    if !any_failed {
        return Response::no_content();
    }
    for entry in &mut results {
        if let Json::Object(obj) = entry {
            obj.entry("status").or_insert_with(|| json!(i32::from(HapStatus::Success)));
        }
    }
    let body = serde_json::to_vec(&json!({ "characteristics": results })).unwrap_or_default();
    Response::json(207, "Multi-Status", body)
}
