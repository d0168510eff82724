//! A typed, permissioned readable/writable value within a service.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;
use uuid::Uuid;

use crate::error::HandlerError;

/// Why a value was rejected by [`Characteristic::set_value`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum ValidationError {
    #[error("value's wire format does not match the characteristic's declared format")]
    WrongFormat,
    #[error("value is outside the characteristic's min/max range")]
    OutOfRange,
    #[error("value is not one of the characteristic's valid values")]
    NotAValidValue,
    #[error("value exceeds the characteristic's max length")]
    TooLong,
}

/// HAP wire formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Bool,
    Int,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    String,
    Data,
    Tlv8,
    Array,
    Dictionary,
}

impl Format {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float => "float",
            Self::String => "string",
            Self::Data => "data",
            Self::Tlv8 => "tlv8",
            Self::Array => "array",
            Self::Dictionary => "dictionary",
        }
    }

    #[must_use]
    fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int | Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64 | Self::Float
        )
    }

    #[must_use]
    fn default_value(self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::UInt64 => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::Data => Value::Data(Vec::new()),
            Self::Tlv8 => Value::Data(Vec::new()),
            Self::Array | Self::Dictionary => Value::String(String::new()),
        }
    }
}

bitflags! {
    /// Characteristic permission flags.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Perms: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const NOTIFY = 1 << 2;
        const HIDDEN = 1 << 3;
        const ADDITIONAL_AUTHORIZATION = 1 << 4;
        const TIMED_WRITE = 1 << 5;
        const WRITE_RESPONSE = 1 << 6;
    }
}

impl Perms {
    /// Renders the subset of permissions the `perms` JSON array expects,
    /// using HAP's two-letter tokens (`pr`, `pw`, `ev`, ...).
    #[must_use]
    pub fn to_hap_tokens(self) -> Vec<&'static str> {
        let table: &[(Perms, &str)] = &[
            (Perms::READ, "pr"),
            (Perms::WRITE, "pw"),
            (Perms::NOTIFY, "ev"),
            (Perms::HIDDEN, "hd"),
            (Perms::ADDITIONAL_AUTHORIZATION, "aa"),
            (Perms::TIMED_WRITE, "tw"),
            (Perms::WRITE_RESPONSE, "wr"),
        ];
        table
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, token)| *token)
            .collect()
    }
}

/// A characteristic's current value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Data(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::Number((*i).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::String(s) => Json::String(s.clone()),
            Self::Data(d) => Json::String(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                d,
            )),
        }
    }
}

/// Optional numeric/string constraints.
#[derive(Clone, Debug, Default)]
pub struct Constraints {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_step: Option<f64>,
    pub valid_values: Option<Vec<i64>>,
    pub valid_values_range: Option<(i64, i64)>,
    pub max_len: Option<usize>,
    pub unit: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Characteristic {
    pub type_id: Uuid,
    pub display_name: String,
    pub format: Format,
    pub perms: Perms,
    pub constraints: Constraints,
    value: Value,
}

impl Characteristic {
    #[must_use]
    pub fn builder(type_id: Uuid, format: Format) -> CharacteristicBuilder {
        CharacteristicBuilder::new(type_id, format)
    }

    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Applies a new value from either a local (device-side) or remote
    /// (controller-side) source, after validating against
    /// format/range/valid-values.
    pub fn set_value(&mut self, value: Value) -> Result<(), ValidationError> {
        self.validate(&value)?;
        self.value = value;
        Ok(())
    }

    fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        match (self.format, value) {
            (Format::Bool, Value::Bool(_)) => {}
            (f, Value::Int(v)) if f.is_numeric() => {
                if let Some(min) = self.constraints.min_value {
                    if (*v as f64) < min {
                        return Err(ValidationError::OutOfRange);
                    }
                }
                if let Some(max) = self.constraints.max_value {
                    if (*v as f64) > max {
                        return Err(ValidationError::OutOfRange);
                    }
                }
                if let Some(values) = &self.constraints.valid_values {
                    if !values.contains(v) {
                        return Err(ValidationError::NotAValidValue);
                    }
                }
                if let Some((lo, hi)) = self.constraints.valid_values_range {
                    if *v < lo || *v > hi {
                        return Err(ValidationError::NotAValidValue);
                    }
                }
            }
            (Format::Float, Value::Float(v)) => {
                if let Some(min) = self.constraints.min_value {
                    if *v < min {
                        return Err(ValidationError::OutOfRange);
                    }
                }
                if let Some(max) = self.constraints.max_value {
                    if *v > max {
                        return Err(ValidationError::OutOfRange);
                    }
                }
            }
            (Format::String, Value::String(s)) => {
                if let Some(max_len) = self.constraints.max_len {
                    if s.len() > max_len {
                        return Err(ValidationError::TooLong);
                    }
                }
            }
            (Format::Data | Format::Tlv8, Value::Data(_)) => {}
            _ => return Err(ValidationError::WrongFormat),
        }
        Ok(())
    }

    pub fn read(&self) -> Result<&Value, HandlerError> {
        if !self.perms.contains(Perms::READ) {
            return Err(HandlerError::WriteOnly { aid: 0, iid: 0 });
        }
        Ok(&self.value)
    }
}

pub struct CharacteristicBuilder {
    type_id: Uuid,
    display_name: String,
    format: Format,
    perms: Perms,
    constraints: Constraints,
    value: Option<Value>,
}

impl CharacteristicBuilder {
    fn new(type_id: Uuid, format: Format) -> Self {
        Self {
            type_id,
            display_name: String::new(),
            format,
            perms: Perms::READ,
            constraints: Constraints::default(),
            value: None,
        }
    }

    #[must_use]
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    #[must_use]
    pub fn perms(mut self, perms: Perms) -> Self {
        self.perms = perms;
        self
    }

    #[must_use]
    pub fn min_value(mut self, v: f64) -> Self {
        self.constraints.min_value = Some(v);
        self
    }

    #[must_use]
    pub fn max_value(mut self, v: f64) -> Self {
        self.constraints.max_value = Some(v);
        self
    }

    #[must_use]
    pub fn min_step(mut self, v: f64) -> Self {
        self.constraints.min_step = Some(v);
        self
    }

    #[must_use]
    pub fn valid_values(mut self, values: Vec<i64>) -> Self {
        self.constraints.valid_values = Some(values);
        self
    }

    #[must_use]
    pub fn max_len(mut self, len: usize) -> Self {
        self.constraints.max_len = Some(len);
        self
    }

    #[must_use]
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.constraints.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn initial_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn build(self) -> Characteristic {
        Characteristic {
            type_id: self.type_id,
            display_name: self.display_name,
            format: self.format,
            perms: self.perms,
            value: self.value.unwrap_or_else(|| self.format.default_value()),
            constraints: self.constraints,
        }
    }
}
