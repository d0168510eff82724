//! Process-level configuration for a HAP accessory server.
//!
//! This is the ambient surface the driver is constructed from: network
//! address, pairing PIN, mDNS setup id, and the path to the persisted
//! [`crate::state::State`]. It carries no protocol logic of its own.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::categories::Category;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("pincode must be 8 digits formatted as XXX-XX-XXX, got {0:?}")]
    MalformedPincode(String),
    #[error("setup_id must be 4 alphanumeric characters, got {0:?}")]
    MalformedSetupId(String),
}

/// Accessory server configuration, loadable from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub address: IpAddr,
    pub port: u16,
    pub accessory_name: String,
    pub category: Category,
    pincode: String,
    setup_id: String,
    pub persist_path: PathBuf,
}

impl Config {
    pub fn new(
        address: IpAddr,
        port: u16,
        accessory_name: impl Into<String>,
        category: Category,
        pincode: impl Into<String>,
        setup_id: impl Into<String>,
        persist_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let cfg = Self {
            address,
            port,
            accessory_name: accessory_name.into(),
            category,
            pincode: pincode.into(),
            setup_id: setup_id.into(),
            persist_path: persist_path.into(),
        };
        cfg.pincode_bytes()?;
        cfg.validate_setup_id()?;
        Ok(cfg)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Validates and returns the PIN's 8 ASCII digit bytes, stripped of the
    /// `XXX-XX-XXX` formatting dashes.
    pub fn pincode_bytes(&self) -> Result<[u8; 8], ConfigError> {
        let digits: Vec<u8> = self
            .pincode
            .bytes()
            .filter(|b| *b != b'-')
            .collect();
        let shape_ok = self.pincode.len() == 10
            && self.pincode.as_bytes()[3] == b'-'
            && self.pincode.as_bytes()[6] == b'-'
            && digits.iter().all(u8::is_ascii_digit);
        if !shape_ok || digits.len() != 8 {
            return Err(ConfigError::MalformedPincode(self.pincode.clone()));
        }
        let mut out = [0u8; 8];
        out.copy_from_slice(&digits);
        Ok(out)
    }

    fn validate_setup_id(&self) -> Result<(), ConfigError> {
        if self.setup_id.len() == 4 && self.setup_id.chars().all(char::is_alphanumeric) {
            Ok(())
        } else {
            Err(ConfigError::MalformedSetupId(self.setup_id.clone()))
        }
    }

    #[must_use]
    pub fn setup_id(&self) -> &str {
        &self.setup_id
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn accepts_well_formed_pincode() {
        let cfg = Config::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            51826,
            "Test Bridge",
            Category::Bridge,
            "031-45-154",
            "ABCD",
            "/tmp/hap-state.json",
        )
        .unwrap();
        assert_eq!(cfg.pincode_bytes().unwrap(), *b"03145154");
    }

    #[test]
    fn rejects_malformed_pincode() {
        let err = Config::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            51826,
            "Test Bridge",
            Category::Bridge,
            "03145154",
            "ABCD",
            "/tmp/hap-state.json",
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_malformed_setup_id() {
        let err = Config::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            51826,
            "Test Bridge",
            Category::Bridge,
            "031-45-154",
            "AB",
            "/tmp/hap-state.json",
        );
        assert!(err.is_err());
    }
}
