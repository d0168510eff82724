//! The identity and pairing store.
//!
//! Holds everything that survives a restart: the accessory's stable MAC
//! identifier, its Ed25519 long-term keypair, the PIN, the mDNS setup id, a
//! monotonically increasing `config_version`, and the table of paired
//! controllers. `State` is the single source of truth the pairing
//! handshakes and the pairings-admin endpoint mutate.

use std::collections::HashMap;
use std::net::IpAddr;

use hap_crypto::Ed25519KeyPair;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A paired controller's permission level.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Permissions {
    User = 0x00,
    Admin = 0x01,
}

impl Permissions {
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Per-connection identity & pairing store.
#[derive(Debug)]
pub struct State {
    pub address: IpAddr,
    pub mac: String,
    pub pincode: [u8; 8],
    pub port: u16,
    pub setup_id: String,
    config_version: u64,
    keypair: Ed25519KeyPair,
    paired_clients: HashMap<Uuid, [u8; 32]>,
    client_properties: HashMap<Uuid, Permissions>,
    uuid_to_bytes: HashMap<Uuid, Vec<u8>>,
}

impl State {
    #[must_use]
    pub fn new(address: IpAddr, mac: String, pincode: [u8; 8], port: u16, setup_id: String) -> Self {
        Self {
            address,
            mac,
            pincode,
            port,
            setup_id,
            config_version: 1,
            keypair: Ed25519KeyPair::generate(),
            paired_clients: HashMap::new(),
            client_properties: HashMap::new(),
            uuid_to_bytes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn keypair(&self) -> &Ed25519KeyPair {
        &self.keypair
    }

    #[must_use]
    pub fn config_version(&self) -> u64 {
        self.config_version
    }

    /// Bumps `config_version`, called whenever the exposed accessory graph
    /// changes. Strictly increasing for the lifetime of the store.
    pub fn bump_config_version(&mut self) {
        self.config_version += 1;
    }

    /// `paired ⇔ paired_clients ≠ ∅`.
    #[must_use]
    pub fn paired(&self) -> bool {
        !self.paired_clients.is_empty()
    }

    #[must_use]
    pub fn is_admin(&self, client: Uuid) -> bool {
        self.client_properties
            .get(&client)
            .is_some_and(|p| p.is_admin())
    }

    #[must_use]
    pub fn long_term_public_key(&self, client: Uuid) -> Option<[u8; 32]> {
        self.paired_clients.get(&client).copied()
    }

    pub fn paired_clients(&self) -> impl Iterator<Item = (Uuid, [u8; 32], Permissions)> + '_ {
        self.paired_clients.iter().map(move |(&uuid, &ltpk)| {
            let perms = self
                .client_properties
                .get(&uuid)
                .copied()
                .unwrap_or(Permissions::User);
            (uuid, ltpk, perms)
        })
    }

    /// Inserts or updates a paired client's long-term public key and
    /// permissions. Used by pair-setup M5 (always with `Permissions::Admin`)
    /// and by `POST /pairings` add (any permission level), which is
    /// idempotent for an existing client.
    pub fn add_paired_client(&mut self, client: Uuid, public_key: [u8; 32], perms: Permissions) {
        self.paired_clients.insert(client, public_key);
        self.client_properties.insert(client, perms);
    }

    /// Removes a paired client. If it was the last admin, every remaining
    /// (necessarily non-admin) client is removed too, atomically. Returns
    /// the set of client UUIDs that were actually removed, so callers can
    /// decide whether the removed set includes the connection's own peer
    /// (which forces an mDNS update).
    pub fn remove_paired_client(&mut self, client: Uuid) -> Vec<Uuid> {
        if self.paired_clients.remove(&client).is_none() {
            return Vec::new();
        }
        let was_admin = self
            .client_properties
            .remove(&client)
            .is_some_and(Permissions::is_admin);
        let mut removed = vec![client];

        let remaining_admins = self
            .client_properties
            .values()
            .any(|p| p.is_admin());
        if was_admin && !remaining_admins {
            let others: Vec<Uuid> = self.paired_clients.keys().copied().collect();
            for other in others {
                self.paired_clients.remove(&other);
                self.client_properties.remove(&other);
                removed.push(other);
            }
        }
        removed
    }

    /// Records the exact username bytes a controller used when pairing, if
    /// not already recorded. Populated on first successful pair-verify for
    /// a given client.
    ///
    /// Returns `true` if this call actually recorded a new entry, so the
    /// caller knows whether a persist is needed.
    pub fn record_username_bytes(&mut self, client: Uuid, bytes: Vec<u8>) -> bool {
        if self.uuid_to_bytes.contains_key(&client) {
            return false;
        }
        self.uuid_to_bytes.insert(client, bytes);
        true
    }

    #[must_use]
    pub fn username_bytes(&self, client: Uuid) -> Option<&[u8]> {
        self.uuid_to_bytes.get(&client).map(Vec::as_slice)
    }

    /// Rebuilds a `State` from its persisted form plus the network-facing
    /// fields that are not persisted (address/port/pincode belong to
    /// runtime configuration, not the pairing store).
    pub(crate) fn from_parts(
        address: IpAddr,
        mac: String,
        pincode: [u8; 8],
        port: u16,
        setup_id: String,
        config_version: u64,
        keypair: Ed25519KeyPair,
        paired_clients: HashMap<Uuid, [u8; 32]>,
        client_properties: HashMap<Uuid, Permissions>,
        uuid_to_bytes: HashMap<Uuid, Vec<u8>>,
    ) -> Self {
        Self {
            address,
            mac,
            pincode,
            port,
            setup_id,
            config_version,
            keypair,
            paired_clients,
            client_properties,
            uuid_to_bytes,
        }
    }

    pub(crate) fn raw_paired_clients(&self) -> &HashMap<Uuid, [u8; 32]> {
        &self.paired_clients
    }

    pub(crate) fn raw_client_properties(&self) -> &HashMap<Uuid, Permissions> {
        &self.client_properties
    }

    pub(crate) fn raw_uuid_to_bytes(&self) -> &HashMap<Uuid, Vec<u8>> {
        &self.uuid_to_bytes
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    fn fresh() -> State {
        State::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "11:22:33:44:55:66".into(),
            *b"03145154",
            51826,
            "ABCD".into(),
        )
    }

    #[test]
    fn starts_unpaired() {
        assert!(!fresh().paired());
    }

    #[test]
    fn pairing_sets_paired_and_admin() {
        let mut s = fresh();
        let client = Uuid::new_v4();
        s.add_paired_client(client, [1u8; 32], Permissions::Admin);
        assert!(s.paired());
        assert!(s.is_admin(client));
        assert_eq!(s.long_term_public_key(client), Some([1u8; 32]));
    }

    #[test]
    fn removing_last_admin_removes_all_non_admins() {
        let mut s = fresh();
        let admin = Uuid::new_v4();
        let user = Uuid::new_v4();
        s.add_paired_client(admin, [1u8; 32], Permissions::Admin);
        s.add_paired_client(user, [2u8; 32], Permissions::User);

        let removed = s.remove_paired_client(admin);
        assert!(removed.contains(&admin));
        assert!(removed.contains(&user));
        assert!(!s.paired());
    }

    #[test]
    fn removing_non_admin_keeps_others() {
        let mut s = fresh();
        let admin = Uuid::new_v4();
        let user = Uuid::new_v4();
        s.add_paired_client(admin, [1u8; 32], Permissions::Admin);
        s.add_paired_client(user, [2u8; 32], Permissions::User);

        let removed = s.remove_paired_client(user);
        assert_eq!(removed, vec![user]);
        assert!(s.paired());
        assert!(s.is_admin(admin));
    }

    #[test]
    fn removing_unknown_client_is_a_noop() {
        let mut s = fresh();
        assert!(s.remove_paired_client(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn readding_existing_client_updates_without_duplicating() {
        let mut s = fresh();
        let client = Uuid::new_v4();
        s.add_paired_client(client, [1u8; 32], Permissions::User);
        s.add_paired_client(client, [2u8; 32], Permissions::Admin);
        assert_eq!(s.paired_clients().count(), 1);
        assert_eq!(s.long_term_public_key(client), Some([2u8; 32]));
        assert!(s.is_admin(client));
    }

    #[test]
    fn config_version_strictly_increases() {
        let mut s = fresh();
        let before = s.config_version();
        s.bump_config_version();
        assert!(s.config_version() > before);
    }

    #[test]
    fn username_bytes_recorded_once() {
        let mut s = fresh();
        let client = Uuid::new_v4();
        assert!(s.record_username_bytes(client, b"first".to_vec()));
        assert!(!s.record_username_bytes(client, b"second".to_vec()));
        assert_eq!(s.username_bytes(client), Some(&b"first"[..]));
    }
}
