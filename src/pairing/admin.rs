//! `POST /pairings`: admin-only add/remove/list of paired controllers.

use uuid::Uuid;

use crate::error::PairingError;
use crate::state::{Permissions, State};
use crate::tlv::{Decoded, Encoder, Tag};

use super::{client_uuid, Sequence};

const REQUEST_ADD: u8 = 3;
const REQUEST_REMOVE: u8 = 4;
const REQUEST_LIST: u8 = 5;

fn array32(bytes: &[u8]) -> Result<[u8; 32], PairingError> {
    bytes.try_into().map_err(|_| {
        PairingError::Malformed(crate::error::TlvError::TruncatedValue {
            expected: 32,
            got: bytes.len(),
        })
    })
}

pub struct AdminOutcome {
    pub response: Vec<u8>,
    pub republish_mdns: bool,
}

/// Handles one `/pairings` request. `requester` is the already
/// pair-verified client the request arrived from; every request type
/// requires it to be an admin, otherwise an authentication error TLV is
/// returned.
pub fn handle(state: &mut State, requester: Uuid, body: &[u8]) -> Result<AdminOutcome, PairingError> {
    if !state.is_admin(requester) {
        return Err(PairingError::InsufficientPrivileges);
    }

    let decoded = Decoded::decode(body)?;
    let request_type = decoded
        .get_u8(Tag::RequestType)
        .ok_or(PairingError::Malformed(crate::error::TlvError::TruncatedLength))?;

    match request_type {
        REQUEST_ADD => add(state, &decoded),
        REQUEST_REMOVE => remove(state, requester, &decoded),
        REQUEST_LIST => Ok(list(state)),
        other => Err(PairingError::UnexpectedSequence {
            expected: REQUEST_ADD,
            got: other,
        }),
    }
}

fn add(state: &mut State, decoded: &Decoded) -> Result<AdminOutcome, PairingError> {
    let username = decoded.get_required(Tag::Username)?;
    let ltpk = array32(decoded.get_required(Tag::PublicKey)?)?;
    let perms = if decoded.get_u8(Tag::Permissions) == Some(Permissions::Admin as u8) {
        Permissions::Admin
    } else {
        Permissions::User
    };

    let client = client_uuid(username)?;
    state.add_paired_client(client, ltpk, perms);

    Ok(AdminOutcome {
        response: Encoder::new().add_u8(Tag::SequenceNum, Sequence::M2 as u8).build(),
        republish_mdns: true,
    })
}

fn remove(state: &mut State, requester: Uuid, decoded: &Decoded) -> Result<AdminOutcome, PairingError> {
    let username = decoded.get_required(Tag::Username)?;
    let client = client_uuid(username)?;
    let removed = state.remove_paired_client(client);

    Ok(AdminOutcome {
        response: Encoder::new().add_u8(Tag::SequenceNum, Sequence::M2 as u8).build(),
        republish_mdns: removed.contains(&requester),
    })
}

fn list(state: &State) -> AdminOutcome {
    let mut encoder = Encoder::new().add_u8(Tag::SequenceNum, Sequence::M2 as u8);
    for (i, (uuid, ltpk, perms)) in state.paired_clients().enumerate() {
        if i > 0 {
            encoder = encoder.separator();
        }
        encoder = encoder
            .add(Tag::Username, uuid.to_string().as_bytes())
            .add(Tag::PublicKey, &ltpk)
            .add_u8(Tag::Permissions, perms as u8);
    }
    AdminOutcome {
        response: encoder.build(),
        republish_mdns: false,
    }
}
