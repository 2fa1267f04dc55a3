//! Address and identity resolution.
//!
//! Peers are named by jids of the form `user[_agent][:device]@server`. The
//! Signal layer only cares about `(user, device)`, so every jid collapses to
//! a [`ProtocolAddress`]. The stringified forms below are the record ids used
//! in the key store, so they must stay injective:
//!
//! - `ProtocolAddress` renders as `user.device`. The device is numeric and
//!   always the last `.` segment, so parsing from the right is unambiguous.
//! - `SenderKeyName` renders as `group::user::device`. `user` never contains
//!   `:`, so the two rightmost `::` separators are unambiguous.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Errors from jid and address parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Jid has no `@server` part.
    #[error("invalid jid (missing server): {0}")]
    MissingServer(String),

    /// User part is empty.
    #[error("invalid jid (empty user): {0}")]
    EmptyUser(String),

    /// User contains a character reserved by the key encoding.
    #[error("invalid user {0:?}: must not contain ':' or '@'")]
    ReservedCharacter(String),

    /// Device suffix is not a number.
    #[error("invalid device {device:?} in {input}")]
    InvalidDevice {
        /// Input being parsed
        input: String,
        /// Offending device text
        device: String,
    },
}

/// Signal protocol address: one device of one user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolAddress {
    user: String,
    device: u32,
}

impl ProtocolAddress {
    /// Address for `device` of `user`.
    pub fn new(user: impl Into<String>, device: u32) -> Result<Self, AddressError> {
        let user = user.into();
        if user.is_empty() {
            return Err(AddressError::EmptyUser(user));
        }
        if user.contains([':', '@']) {
            return Err(AddressError::ReservedCharacter(user));
        }
        Ok(Self { user, device })
    }

    /// Resolve a jid to its protocol address.
    ///
    /// The agent suffix (`_agent`) is dropped and a missing device means
    /// device 0, so `123@s.whatsapp.net` and `123_1:0@s.whatsapp.net` resolve
    /// to the same address.
    pub fn from_jid(jid: &str) -> Result<Self, AddressError> {
        let (user_combined, _server) =
            jid.split_once('@').ok_or_else(|| AddressError::MissingServer(jid.to_string()))?;

        let (user_agent, device) = match user_combined.split_once(':') {
            Some((user_agent, device)) => {
                let device = device.parse::<u32>().map_err(|_| AddressError::InvalidDevice {
                    input: jid.to_string(),
                    device: device.to_string(),
                })?;
                (user_agent, device)
            },
            None => (user_combined, 0),
        };

        let user = user_agent.split('_').next().unwrap_or_default();
        if user.is_empty() {
            return Err(AddressError::EmptyUser(jid.to_string()));
        }

        Self::new(user, device)
    }

    /// User part.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Device id.
    pub fn device(&self) -> u32 {
        self.device
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.user, self.device)
    }
}

impl FromStr for ProtocolAddress {
    type Err = AddressError;

    /// Parse the canonical `user.device` encoding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, device) = s.rsplit_once('.').ok_or_else(|| AddressError::InvalidDevice {
            input: s.to_string(),
            device: String::new(),
        })?;
        let device = device.parse::<u32>().map_err(|_| AddressError::InvalidDevice {
            input: s.to_string(),
            device: device.to_string(),
        })?;
        Self::new(user, device)
    }
}

/// Identity of one sender's key chain inside one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    /// Sender key name for `sender` in `group_id`.
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Self {
        Self { group_id: group_id.into(), sender }
    }

    /// Resolve `(group, author jid)`.
    pub fn from_jid(group_id: &str, author_jid: &str) -> Result<Self, AddressError> {
        Ok(Self::new(group_id, ProtocolAddress::from_jid(author_jid)?))
    }

    /// Group identifier.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Sender address.
    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.group_id, self.sender.user, self.sender.device)
    }
}

/// Scope of transactional exclusivity.
///
/// Pairwise operations lock the peer's address (not the raw jid, so two jids
/// naming the same device share one lock). Group operations lock the group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    /// Pairwise session with one device
    Peer(ProtocolAddress),
    /// Sender-key state of one group
    Group(String),
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Peer(address) => write!(f, "peer:{address}"),
            Self::Group(group_id) => write!(f, "group:{group_id}"),
        }
    }
}
