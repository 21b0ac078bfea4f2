//! Invite URIs (`beenet:swarm/...`)
//!
//! An invite parameterizes a swarm join: the swarm id, optional human
//! name, seed addresses, and optional admission secrets. Format:
//!
//! ```text
//! beenet:swarm/<base32-swarm-id>[@<swarmname>][?seed=<multiaddr>&psk=<base32>&token=<base64url>&name=<swarmname>&ttl=<seconds>]
//! ```

use beenet_core::{SwarmId, SwarmName};
use data_encoding::BASE32_NOPAD;
use thiserror::Error;

/// The URI scheme prefix for Beenet invites.
const INVITE_SCHEME: &str = "beenet:swarm/";

/// Invite parsing errors
#[derive(Debug, Error)]
pub enum InviteError {
    #[error("invalid invite uri: {0}")]
    InvalidUri(String),
    #[error("invalid swarm id: {0}")]
    InvalidSwarmId(String),
    #[error("invalid swarm name: {0}")]
    InvalidSwarmName(String),
}

/// Decoded invite contents.
#[derive(Clone, Debug, PartialEq)]
pub struct Invite {
    pub swarm_id: SwarmId,
    pub name: Option<SwarmName>,
    pub seeds: Vec<String>,
    pub psk: Option<Vec<u8>>,
    pub token: Option<String>,
    pub ttl_secs: Option<u64>,
}

impl Invite {
    pub fn new(swarm_id: SwarmId) -> Self {
        Self {
            swarm_id,
            name: None,
            seeds: Vec::new(),
            psk: None,
            token: None,
            ttl_secs: None,
        }
    }
}

/// Encode an invite as a `beenet:swarm/...` URI.
pub fn encode_invite(invite: &Invite) -> String {
    let mut uri = format!("{INVITE_SCHEME}{}", invite.swarm_id);
    if let Some(name) = &invite.name {
        uri.push('@');
        uri.push_str(name.as_str());
    }

    let mut params: Vec<String> = Vec::new();
    for seed in &invite.seeds {
        params.push(format!("seed={seed}"));
    }
    if let Some(psk) = &invite.psk {
        params.push(format!(
            "psk={}",
            BASE32_NOPAD.encode(psk).to_ascii_lowercase()
        ));
    }
    if let Some(token) = &invite.token {
        use base64::Engine;
        params.push(format!(
            "token={}",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token.as_bytes())
        ));
    }
    if let Some(name) = &invite.name {
        params.push(format!("name={}", name.as_str()));
    }
    if let Some(ttl) = invite.ttl_secs {
        params.push(format!("ttl={ttl}"));
    }

    if !params.is_empty() {
        uri.push('?');
        uri.push_str(&params.join("&"));
    }
    uri
}

/// Parse a `beenet:swarm/...` URI back into an [`Invite`].
pub fn parse_invite(uri: &str) -> Result<Invite, InviteError> {
    let rest = uri
        .strip_prefix(INVITE_SCHEME)
        .ok_or_else(|| InviteError::InvalidUri(format!("missing {INVITE_SCHEME} prefix")))?;

    let (head, query) = match rest.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (rest, None),
    };

    let (id_part, name_part) = match head.split_once('@') {
        Some((id, name)) => (id, Some(name)),
        None => (head, None),
    };

    let swarm_id =
        SwarmId::parse(id_part).map_err(|e| InviteError::InvalidSwarmId(e.to_string()))?;

    let mut invite = Invite::new(swarm_id);
    invite.name = match name_part {
        Some(name) => Some(
            SwarmName::parse(name).map_err(|e| InviteError::InvalidSwarmName(e.to_string()))?,
        ),
        None => None,
    };

    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| InviteError::InvalidUri(format!("bad query pair {pair:?}")))?;
            match key {
                "seed" => invite.seeds.push(value.to_string()),
                "psk" => {
                    let bytes = BASE32_NOPAD
                        .decode(value.to_ascii_uppercase().as_bytes())
                        .map_err(|e| InviteError::InvalidUri(format!("psk decode: {e}")))?;
                    invite.psk = Some(bytes);
                }
                "token" => {
                    use base64::Engine;
                    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
                        .decode(value.as_bytes())
                        .map_err(|e| InviteError::InvalidUri(format!("token decode: {e}")))?;
                    let token = String::from_utf8(bytes)
                        .map_err(|e| InviteError::InvalidUri(format!("token utf8: {e}")))?;
                    invite.token = Some(token);
                }
                "name" => {
                    let name = SwarmName::parse(value)
                        .map_err(|e| InviteError::InvalidSwarmName(e.to_string()))?;
                    invite.name = Some(name);
                }
                "ttl" => {
                    let ttl = value
                        .parse::<u64>()
                        .map_err(|e| InviteError::InvalidUri(format!("ttl parse: {e}")))?;
                    invite.ttl_secs = Some(ttl);
                }
                // Unknown parameters are ignored for forward compatibility.
                _ => {}
            }
        }
    }

    Ok(invite)
}
