use std::ops::ControlFlow;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::error::{ContextError, DecryptionError, MerchantFailure};
use crate::strategy::{DecryptionStrategy, EcV2DecryptionStrategy};
use crate::types::{DecryptedMessage, PaymentMethodToken, ProtocolVersion};

/// One merchant private key registered with Google Pay.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantConfig {
    /// Optional label attached to failures from this key.
    #[serde(default)]
    pub identifier: Option<String>,
    /// PEM encoded P-256 private key.
    #[serde(deserialize_with = "pem_bytes")]
    pub private_key_pem: Vec<u8>,
}

impl MerchantConfig {
    pub fn new(private_key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            identifier: None,
            private_key_pem: private_key_pem.into(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

impl std::fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

fn pem_bytes<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    String::deserialize(deserializer).map(String::into_bytes)
}

/// Serializable form of the context configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextOptions {
    pub merchants: Vec<MerchantConfig>,
}

// The parsed key is memoised after the first successful parse.
struct Merchant {
    config: MerchantConfig,
    strategy: OnceCell<EcV2DecryptionStrategy>,
}

impl Merchant {
    fn strategy(&self) -> Result<&EcV2DecryptionStrategy, DecryptionError> {
        self.strategy
            .get_or_try_init(|| EcV2DecryptionStrategy::from_pem(&self.config.private_key_pem))
    }

    fn decrypt(&self, signed_message: &str) -> Result<DecryptedMessage, MerchantFailure> {
        self.strategy()
            .and_then(|strategy| strategy.decrypt(signed_message))
            .map_err(|error| MerchantFailure {
                merchant_identifier: self.config.identifier.clone(),
                error,
            })
    }
}

/// Decrypts payment method tokens with one or more merchant keys.
///
/// Keys are tried in configured order and the first one that opens the token
/// wins, so during a key rotation put the active key first.
pub struct GooglePaymentMethodTokenContext {
    merchants: Vec<Merchant>,
}

impl GooglePaymentMethodTokenContext {
    /// Fails with [`ContextError::Configuration`] when `merchants` is empty.
    /// Key material is not parsed until the first decryption.
    pub fn new(merchants: Vec<MerchantConfig>) -> Result<Self, ContextError> {
        if merchants.is_empty() {
            return Err(ContextError::Configuration);
        }

        let merchants = merchants
            .into_iter()
            .map(|config| Merchant {
                config,
                strategy: OnceCell::new(),
            })
            .collect();

        Ok(Self { merchants })
    }

    pub fn merchant_identifiers(&self) -> impl Iterator<Item = Option<&str>> {
        self.merchants
            .iter()
            .map(|merchant| merchant.config.identifier.as_deref())
    }

    pub fn decrypt(&self, token: &PaymentMethodToken) -> Result<DecryptedMessage, ContextError> {
        let version = ProtocolVersion::from_wire(&token.protocol_version)
            .ok_or_else(|| ContextError::UnsupportedProtocol(token.protocol_version.clone()))?;

        match version {
            ProtocolVersion::EcV2 => self.decrypt_with_merchants(&token.signed_message),
        }
    }

    /// Parses the raw token JSON before decrypting it.
    pub fn decrypt_json(&self, token: &str) -> Result<DecryptedMessage, ContextError> {
        let token: PaymentMethodToken = serde_json::from_str(token)
            .map_err(|err| ContextError::MalformedToken(err.to_string()))?;
        self.decrypt(&token)
    }

    fn decrypt_with_merchants(&self, signed_message: &str) -> Result<DecryptedMessage, ContextError> {
        let outcome = self
            .merchants
            .iter()
            .try_fold(Vec::new(), |mut causes, merchant| {
                match merchant.decrypt(signed_message) {
                    Ok(message) => ControlFlow::Break(message),
                    Err(failure) => {
                        debug!(%failure, "merchant key did not open the token");
                        causes.push(failure);
                        ControlFlow::Continue(causes)
                    }
                }
            });

        match outcome {
            ControlFlow::Break(message) => Ok(message),
            ControlFlow::Continue(causes) => {
                warn!(attempts = causes.len(), "no merchant key opened the token");
                Err(ContextError::Aggregated { causes })
            }
        }
    }
}

impl TryFrom<ContextOptions> for GooglePaymentMethodTokenContext {
    type Error = ContextError;

    fn try_from(options: ContextOptions) -> Result<Self, Self::Error> {
        Self::new(options.merchants)
    }
}
