//! HAP JSON projections for `GET /accessories` and the `/characteristics`
//! endpoints.

use serde::Serialize;
use serde_json::{json, Value as Json};
use uuid::Uuid;

use super::accessory::Accessory;
use super::characteristic::{Characteristic, Perms};
use super::service::Service;

/// The low 96 bits of Apple's base UUID (`0000xxxx-0000-1000-8000-0026BB765291`).
/// A type UUID whose low 96 bits match this constant is one of HAP's own
/// defined types and is rendered in short form (the 8-character hex prefix);
/// anything else (a vendor extension type) is rendered as the full
/// hyphenated UUID.
const BASE_LOW_96: u128 = 0x0000_1000_8000_0026_BB76_5291;
const LOW_96_MASK: u128 = (1u128 << 96) - 1;

/// Renders a characteristic/service type UUID the way a HomeKit controller
/// expects it on the wire.
#[must_use]
pub fn render_type(uuid: Uuid) -> String {
    let value = uuid.as_u128();
    if value & LOW_96_MASK == BASE_LOW_96 {
        format!("{:08X}", (value >> 96) as u32)
    } else {
        uuid.to_string().to_uppercase()
    }
}

fn characteristic_to_json(iid: u64, type_id: Uuid, c: &Characteristic) -> Json {
    let mut obj = serde_json::Map::new();
    obj.insert("iid".into(), json!(iid));
    obj.insert("type".into(), json!(render_type(type_id)));
    obj.insert("perms".into(), json!(c.perms.to_hap_tokens()));
    obj.insert("format".into(), json!(c.format.as_str()));

    if c.perms.contains(Perms::READ) {
        obj.insert("value".into(), c.value().to_json());
    }
    if let Some(unit) = &c.constraints.unit {
        obj.insert("unit".into(), json!(unit));
    }
    if let Some(min) = c.constraints.min_value {
        obj.insert("minValue".into(), json!(min));
    }
    if let Some(max) = c.constraints.max_value {
        obj.insert("maxValue".into(), json!(max));
    }
    if let Some(step) = c.constraints.min_step {
        obj.insert("minStep".into(), json!(step));
    }
    if let Some(max_len) = c.constraints.max_len {
        obj.insert("maxLen".into(), json!(max_len));
    }
    if let Some(values) = &c.constraints.valid_values {
        obj.insert("valid-values".into(), json!(values));
    }
    if let Some((lo, hi)) = c.constraints.valid_values_range {
        obj.insert("valid-values-range".into(), json!([lo, hi]));
    }
    Json::Object(obj)
}

fn service_to_json(service_iid: u64, service: &Service, char_iids: &[u64]) -> Json {
    let characteristics: Vec<Json> = service
        .characteristics()
        .iter()
        .zip(char_iids.iter().copied())
        .map(|(c, iid)| characteristic_to_json(iid, c.type_id, c))
        .collect();

    let mut obj = serde_json::Map::new();
    obj.insert("iid".into(), json!(service_iid));
    obj.insert("type".into(), json!(render_type(service.type_id)));
    if service.primary {
        obj.insert("primary".into(), json!(true));
    }
    if service.hidden {
        obj.insert("hidden".into(), json!(true));
    }
    if !service.linked_services().is_empty() {
        obj.insert("linked".into(), json!(service.linked_services()));
    }
    obj.insert("characteristics".into(), Json::Array(characteristics));
    Json::Object(obj)
}

/// Builds the `{aid, services: [...]}` object for a single accessory.
#[must_use]
pub fn accessory_to_json(accessory: &Accessory) -> Json {
    let services: Vec<Json> = accessory
        .services()
        .iter()
        .enumerate()
        .map(|(service_index, service)| {
            let service_iid = accessory
                .service_iid(service_index)
                .expect("service was added through Accessory::add_service");
            let char_iids: Vec<u64> = (0..service.characteristics().len())
                .map(|char_index| {
                    accessory
                        .characteristic_iid(service_index, char_index)
                        .expect("characteristic was added through Accessory::add_service")
                })
                .collect();
            service_to_json(service_iid, service, &char_iids)
        })
        .collect();

    json!({ "aid": accessory.aid, "services": services })
}

/// Builds the full `GET /accessories` body for a bridge or standalone
/// accessory set.
#[must_use]
pub fn accessories_to_json(accessories: &[Accessory]) -> Json {
    json!({
        "accessories": accessories.iter().map(accessory_to_json).collect::<Vec<_>>()
    })
}

/// One `{aid, iid, status}` or `{aid, iid, value}` entry in a
/// `/characteristics` response, as produced by a single read or write.
#[derive(Serialize)]
pub struct CharacteristicResult {
    pub aid: u64,
    pub iid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Json>,
}
