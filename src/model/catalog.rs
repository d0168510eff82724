//! A process-wide immutable catalog of standard HAP service and
//! characteristic definitions, parsed once from embedded JSON and handed
//! out by name — including the mandatory `AccessoryInformation` service
//! (Identify, Manufacturer, Model, Name, SerialNumber, FirmwareRevision).

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;
use uuid::Uuid;

use super::characteristic::{Characteristic, Format, Perms};
use super::service::Service;

const CHARACTERISTICS_JSON: &str = include_str!("catalog/characteristics.json");
const SERVICES_JSON: &str = include_str!("catalog/services.json");

#[derive(Deserialize)]
struct RawCharacteristic {
    uuid: Uuid,
    format: String,
    perms: Vec<String>,
    unit: Option<String>,
    #[serde(rename = "minValue")]
    min_value: Option<f64>,
    #[serde(rename = "maxValue")]
    max_value: Option<f64>,
    #[serde(rename = "minStep")]
    min_step: Option<f64>,
    #[serde(rename = "maxLen")]
    max_len: Option<usize>,
    #[serde(rename = "validValues")]
    valid_values: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct RawService {
    uuid: Uuid,
    required: Vec<String>,
    #[serde(default)]
    optional: Vec<String>,
}

fn parse_format(s: &str) -> Format {
    match s {
        "bool" => Format::Bool,
        "int" => Format::Int,
        "uint8" => Format::UInt8,
        "uint16" => Format::UInt16,
        "uint32" => Format::UInt32,
        "uint64" => Format::UInt64,
        "float" => Format::Float,
        "string" => Format::String,
        "data" => Format::Data,
        "tlv8" => Format::Tlv8,
        "array" => Format::Array,
        "dictionary" => Format::Dictionary,
        other => panic!("catalog references unknown format {other:?}"),
    }
}

fn parse_perms(tokens: &[String]) -> Perms {
    let mut perms = Perms::empty();
    for token in tokens {
        perms |= match token.as_str() {
            "pr" => Perms::READ,
            "pw" => Perms::WRITE,
            "ev" => Perms::NOTIFY,
            "hd" => Perms::HIDDEN,
            "aa" => Perms::ADDITIONAL_AUTHORIZATION,
            "tw" => Perms::TIMED_WRITE,
            "wr" => Perms::WRITE_RESPONSE,
            other => panic!("catalog references unknown perm token {other:?}"),
        };
    }
    perms
}

fn characteristics() -> &'static HashMap<String, RawCharacteristic> {
    static MAP: OnceLock<HashMap<String, RawCharacteristic>> = OnceLock::new();
    MAP.get_or_init(|| {
        serde_json::from_str(CHARACTERISTICS_JSON).expect("embedded characteristics.json is valid")
    })
}

fn services() -> &'static HashMap<String, RawService> {
    static MAP: OnceLock<HashMap<String, RawService>> = OnceLock::new();
    MAP.get_or_init(|| {
        serde_json::from_str(SERVICES_JSON).expect("embedded services.json is valid")
    })
}

/// Builds a fresh characteristic instance from the catalog entry named
/// `name` (e.g. `"on"`, `"brightness"`), or `None` if no such entry exists.
#[must_use]
pub fn characteristic(name: &str) -> Option<Characteristic> {
    let raw = characteristics().get(name)?;
    let mut builder = Characteristic::builder(raw.uuid, parse_format(&raw.format))
        .perms(parse_perms(&raw.perms));
    if let Some(unit) = &raw.unit {
        builder = builder.unit(unit.clone());
    }
    if let Some(min) = raw.min_value {
        builder = builder.min_value(min);
    }
    if let Some(max) = raw.max_value {
        builder = builder.max_value(max);
    }
    if let Some(step) = raw.min_step {
        builder = builder.min_step(step);
    }
    if let Some(max_len) = raw.max_len {
        builder = builder.max_len(max_len);
    }
    if let Some(values) = &raw.valid_values {
        builder = builder.valid_values(values.clone());
    }
    Some(builder.build())
}

/// Builds a fresh service instance from the catalog entry named `name`
/// (e.g. `"accessory-information"`, `"lightbulb"`), attaching every
/// required characteristic. Optional characteristics are listed in the
/// catalog but left for the caller to attach explicitly via
/// [`Service::with_characteristic`] when the accessory actually supports
/// them.
#[must_use]
pub fn service(name: &str) -> Option<Service> {
    let raw = services().get(name)?;
    let mut svc = Service::new(raw.uuid);
    for char_name in &raw.required {
        let c = characteristic(char_name)
            .unwrap_or_else(|| panic!("service {name:?} references unknown characteristic {char_name:?}"));
        svc = svc.with_characteristic(c);
    }
    Some(svc)
}

/// The well-known type UUID of the mandatory `Identify` characteristic,
/// used to recognize a write that should trigger an `Identify` capability.
#[must_use]
pub fn identify_type_id() -> Uuid {
    characteristics().get("identify").expect("catalog defines identify").uuid
}

/// The catalog names of a service's optional characteristics, for callers
/// that want to offer them selectively.
#[must_use]
pub fn optional_characteristics(service_name: &str) -> &'static [String] {
    services()
        .get(service_name)
        .map_or(&[], |raw| raw.optional.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mandatory_accessory_information_service() {
        let svc = service("accessory-information").expect("catalog entry exists");
        assert_eq!(svc.characteristics().len(), 6);
    }

    #[test]
    fn builds_characteristic_with_range_constraints() {
        let brightness = characteristic("brightness").expect("catalog entry exists");
        assert_eq!(brightness.format, Format::Int);
        assert_eq!(brightness.constraints.max_value, Some(100.0));
    }

    #[test]
    fn unknown_name_returns_none() {
        assert!(characteristic("does-not-exist").is_none());
        assert!(service("does-not-exist").is_none());
    }

    #[test]
    fn lightbulb_lists_optional_characteristics() {
        let optional = optional_characteristics("lightbulb");
        assert!(optional.iter().any(|n| n == "brightness"));
    }

    #[test]
    fn identify_type_id_matches_the_identify_characteristic() {
        let identify = characteristic("identify").expect("catalog entry exists");
        assert_eq!(identify_type_id(), identify.type_id);
    }
}
