//! Sender key wire messages.
//!
//! Both messages are CBOR. A [`SenderKeyMessage`] is a signed envelope around
//! the encrypted body; the signature covers the encoded body bytes exactly as
//! transmitted.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::error::SenderKeyError;

/// Current message format version.
pub const SENDER_KEY_VERSION: u8 = 3;

pub(crate) fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SenderKeyError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| SenderKeyError::Codec(format!("CBOR encode failed: {e}")))?;
    Ok(bytes)
}

pub(crate) fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SenderKeyError> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| SenderKeyError::Codec(format!("CBOR decode failed: {e}")))
}

fn check_version(version: u8) -> Result<(), SenderKeyError> {
    if version == SENDER_KEY_VERSION {
        Ok(())
    } else {
        Err(SenderKeyError::Codec(format!("unsupported sender key version: {version}")))
    }
}

#[derive(Serialize, Deserialize)]
struct MessageBody {
    version: u8,
    key_id: u32,
    iteration: u32,
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignedEnvelope {
    body: Vec<u8>,
    signature: Vec<u8>,
}

/// An encrypted group message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKeyMessage {
    key_id: u32,
    iteration: u32,
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
    body: Vec<u8>,
    signature: [u8; 64],
}

impl SenderKeyMessage {
    /// Build and sign a message.
    pub fn sign(
        key_id: u32,
        iteration: u32,
        nonce: [u8; 24],
        ciphertext: Vec<u8>,
        signing_key: &SigningKey,
    ) -> Result<Self, SenderKeyError> {
        let body = to_cbor(&MessageBody {
            version: SENDER_KEY_VERSION,
            key_id,
            iteration,
            nonce,
            ciphertext: ciphertext.clone(),
        })?;
        let signature = signing_key.sign(&body).to_bytes();

        Ok(Self { key_id, iteration, nonce, ciphertext, body, signature })
    }

    /// Parse a message from the wire. The signature is not checked here;
    /// see [`Self::verify`].
    pub fn parse(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        let envelope: SignedEnvelope = from_cbor(bytes)?;
        let body: MessageBody = from_cbor(&envelope.body)?;
        check_version(body.version)?;

        let signature: [u8; 64] = envelope
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| SenderKeyError::Codec("invalid signature length".to_string()))?;

        Ok(Self {
            key_id: body.key_id,
            iteration: body.iteration,
            nonce: body.nonce,
            ciphertext: body.ciphertext,
            body: envelope.body,
            signature,
        })
    }

    /// Encode for the wire.
    pub fn serialize(&self) -> Result<Vec<u8>, SenderKeyError> {
        to_cbor(&SignedEnvelope { body: self.body.clone(), signature: self.signature.to_vec() })
    }

    /// Check the signature against the sender's verifying key.
    pub fn verify(&self, verifying_key: &VerifyingKey) -> Result<(), SenderKeyError> {
        let signature = Signature::from_bytes(&self.signature);
        verifying_key
            .verify(&self.body, &signature)
            .map_err(|_| SenderKeyError::InvalidSignature)
    }

    /// Chain the message was encrypted under.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Chain iteration of the message key.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// AEAD nonce.
    pub fn nonce(&self) -> &[u8; 24] {
        &self.nonce
    }

    /// AEAD ciphertext including tag.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

/// Announcement of a sender's chain, sent to group members so they can
/// decrypt that sender's messages from `iteration` onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderKeyDistributionMessage {
    version: u8,
    key_id: u32,
    iteration: u32,
    chain_seed: [u8; 32],
    signing_public: [u8; 32],
}

impl SenderKeyDistributionMessage {
    /// Distribution message for a chain positioned at `iteration`.
    pub fn new(key_id: u32, iteration: u32, chain_seed: [u8; 32], signing_public: [u8; 32]) -> Self {
        Self { version: SENDER_KEY_VERSION, key_id, iteration, chain_seed, signing_public }
    }

    /// Parse a serialized distribution message.
    pub fn parse(bytes: &[u8]) -> Result<Self, SenderKeyError> {
        let message: Self = from_cbor(bytes)?;
        check_version(message.version)?;
        Ok(message)
    }

    /// Encode for the wire.
    pub fn serialize(&self) -> Result<Vec<u8>, SenderKeyError> {
        to_cbor(self)
    }

    /// Chain identifier.
    pub fn key_id(&self) -> u32 {
        self.key_id
    }

    /// Iteration the announced chain link is at.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Announced chain seed.
    pub fn chain_seed(&self) -> &[u8; 32] {
        &self.chain_seed
    }

    /// Sender's Ed25519 verifying key.
    pub fn signing_public(&self) -> &[u8; 32] {
        &self.signing_public
    }
}
