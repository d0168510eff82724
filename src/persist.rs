//! JSON persistence for [`State`], written atomically (write-temp, rename).

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistError;
use crate::state::{Permissions, State};

#[derive(Serialize, Deserialize)]
struct PersistedClientProperties {
    perms: u8,
}

/// On-disk shape of [`State`].
#[derive(Serialize, Deserialize)]
pub struct PersistedState {
    mac: String,
    config_version: u64,
    paired_clients: HashMap<Uuid, String>,
    client_properties: HashMap<Uuid, PersistedClientProperties>,
    uuid_to_bytes: HashMap<Uuid, String>,
    private_key: String,
    public_key: String,
}

impl PersistedState {
    #[must_use]
    pub fn from_state(state: &State) -> Self {
        Self {
            mac: state.mac.clone(),
            config_version: state.config_version(),
            paired_clients: state
                .raw_paired_clients()
                .iter()
                .map(|(uuid, ltpk)| (*uuid, hex::encode(ltpk)))
                .collect(),
            client_properties: state
                .raw_client_properties()
                .iter()
                .map(|(uuid, perms)| {
                    (
                        *uuid,
                        PersistedClientProperties {
                            perms: *perms as u8,
                        },
                    )
                })
                .collect(),
            uuid_to_bytes: state
                .raw_uuid_to_bytes()
                .iter()
                .map(|(uuid, bytes)| (*uuid, hex::encode(bytes)))
                .collect(),
            private_key: hex::encode(state.keypair().seed()),
            public_key: hex::encode(state.keypair().public_key()),
        }
    }

    /// Reassembles a [`State`] using this persisted pairing data together
    /// with the network-facing fields supplied by [`crate::Config`].
    pub fn into_state(
        self,
        address: IpAddr,
        pincode: [u8; 8],
        port: u16,
        setup_id: String,
    ) -> Result<State, PersistError> {
        let seed: [u8; 32] = hex::decode(&self.private_key)
            .map_err(|e| PersistError::Serialize(serde::de::Error::custom(e.to_string())))?
            .try_into()
            .map_err(|_| {
                PersistError::Serialize(serde::de::Error::custom("private key must be 32 bytes"))
            })?;
        let keypair = hap_crypto::Ed25519KeyPair::from_seed(&seed);

        let paired_clients = self
            .paired_clients
            .into_iter()
            .map(|(uuid, hex_key)| -> Result<_, PersistError> {
                let bytes: [u8; 32] = hex::decode(&hex_key)
                    .map_err(|e| PersistError::Serialize(serde::de::Error::custom(e.to_string())))?
                    .try_into()
                    .map_err(|_| {
                        PersistError::Serialize(serde::de::Error::custom(
                            "long-term public key must be 32 bytes",
                        ))
                    })?;
                Ok((uuid, bytes))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        let client_properties = self
            .client_properties
            .into_iter()
            .map(|(uuid, props)| {
                let perms = if props.perms == Permissions::Admin as u8 {
                    Permissions::Admin
                } else {
                    Permissions::User
                };
                (uuid, perms)
            })
            .collect();

        let uuid_to_bytes = self
            .uuid_to_bytes
            .into_iter()
            .map(|(uuid, hex_bytes)| -> Result<_, PersistError> {
                let bytes = hex::decode(&hex_bytes)
                    .map_err(|e| PersistError::Serialize(serde::de::Error::custom(e.to_string())))?;
                Ok((uuid, bytes))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(State::from_parts(
            address,
            self.mac,
            pincode,
            port,
            setup_id,
            self.config_version,
            keypair,
            paired_clients,
            client_properties,
            uuid_to_bytes,
        ))
    }
}

use serde::de::Error as _;

/// Writes `state` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination.
pub async fn save_atomic(path: &Path, state: &State) -> Result<(), PersistError> {
    let persisted = PersistedState::from_state(state);
    let json = serde_json::to_vec_pretty(&persisted)?;
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &json).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

pub async fn load(
    path: &Path,
    address: IpAddr,
    pincode: [u8; 8],
    port: u16,
    setup_id: String,
) -> Result<Option<State>, PersistError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let persisted: PersistedState = serde_json::from_slice(&bytes)?;
    Ok(Some(persisted.into_state(address, pincode, port, setup_id)?))
}
