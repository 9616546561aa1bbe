use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::PROTOCOL;

/// Protocol versions this crate knows how to decrypt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum ProtocolVersion {
    #[serde(rename = "ECv2")]
    EcV2,
}

impl ProtocolVersion {
    /// Maps the token's `protocolVersion` string to a supported version.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            PROTOCOL => Some(ProtocolVersion::EcV2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::EcV2 => PROTOCOL,
        }
    }
}

/// The token handed to the merchant by Google Pay.
///
/// The protocol version is kept as a raw string so an unsupported value can be
/// reported as received. The signature fields are carried but never verified here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodToken {
    pub protocol_version: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub intermediate_signing_key: IntermediateSigningKey,
    pub signed_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntermediateSigningKey {
    pub signed_key: String,
    pub signatures: Vec<String>,
}

impl IntermediateSigningKey {
    /// Parses the JSON held in `signedKey`.
    pub fn parse_signed_key(&self) -> serde_json::Result<SignedKey> {
        serde_json::from_str(&self.signed_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignedKey {
    pub key_value: String,
    pub key_expiration: String,
}

/// The JSON document carried in `signedMessage`. All fields are base64.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    pub encrypted_message: String,
    pub ephemeral_public_key: String,
    pub tag: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum PaymentMethod {
    #[serde(rename = "CARD")]
    Card,
}

/// Decrypted payload of a card token.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    pub message_expiration: String,
    pub message_id: String,
    pub payment_method: PaymentMethod,
    pub payment_method_details: PaymentMethodDetails,
}

impl DecryptedMessage {
    /// `messageExpiration` as a UTC instant; it is sent as epoch milliseconds.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        let millis: i128 = self.message_expiration.parse().ok()?;
        OffsetDateTime::from_unix_timestamp_nanos(millis.checked_mul(1_000_000)?).ok()
    }

    /// An unparseable expiration counts as expired.
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        match self.expires_at() {
            Some(expiration) => now >= expiration,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodDetails {
    pub pan: String,
    pub expiration_month: u8,
    pub expiration_year: u16,
    #[serde(flatten)]
    pub auth: AuthMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "authMethod")]
pub enum AuthMethod {
    #[serde(rename = "PAN_ONLY")]
    PanOnly,
    #[serde(rename = "CRYPTOGRAM_3DS", rename_all = "camelCase")]
    Cryptogram3ds {
        cryptogram: String,
        eci_indicator: String,
    },
}
