use thiserror::Error;

/// Failure of a single decryption attempt with one merchant key.
///
/// From the rotation point of view every variant means the same thing: this key
/// does not open this message. The variants exist for diagnostics.
#[derive(Debug, Error)]
pub enum DecryptionError {
    #[error("failed to parse the merchant private key: {0}")]
    KeyParse(String),

    #[error("malformed signed message: {0}")]
    MalformedMessage(String),

    #[error("key agreement with the ephemeral public key failed: {0}")]
    KeyAgreement(String),

    #[error("failed to derive the symmetric keys")]
    KeyDerivation,

    #[error("Tag is not a valid MAC for the encrypted message")]
    TagVerification,

    #[error("failed to decrypt the encrypted message: {0}")]
    Cipher(String),

    #[error("failed to decode the decrypted payload: {0}")]
    PayloadDecode(String),
}

/// A decryption failure attributed to the merchant whose key was tried.
#[derive(Debug, Error)]
#[error("merchant {}: {error}", .merchant_identifier.as_deref().unwrap_or("<unnamed>"))]
pub struct MerchantFailure {
    pub merchant_identifier: Option<String>,
    #[source]
    pub error: DecryptionError,
}

/// Errors surfaced by [`crate::GooglePaymentMethodTokenContext`].
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("No merchant configuration provided for decryption context.")]
    Configuration,

    #[error("Unsupported decryption for protocol version {0}")]
    UnsupportedProtocol(String),

    #[error("malformed payment method token: {0}")]
    MalformedToken(String),

    /// Every configured merchant key failed. Causes are kept in configured order.
    #[error("Failed to decrypt payment data using provided merchant configuration(s).")]
    Aggregated { causes: Vec<MerchantFailure> },
}

impl ContextError {
    /// Per-merchant causes of an aggregated failure, empty for other variants.
    pub fn causes(&self) -> &[MerchantFailure] {
        match self {
            ContextError::Aggregated { causes } => causes,
            _ => &[],
        }
    }
}
