//! Decryption of Google Pay `ECv2` payment method tokens.
//!
//! A [`GooglePaymentMethodTokenContext`] holds one or more merchant private keys
//! and tries each of them, in order, against an incoming token. Every key is
//! driven through [`EcV2DecryptionStrategy`]: ECDH with the token's ephemeral
//! public key, HKDF-SHA256, an HMAC-SHA256 tag check and AES-256-CTR.
//!
//! ```no_run
//! use google_pay_decrypt::{GooglePaymentMethodTokenContext, MerchantConfig};
//!
//! # fn run(token_json: &str, active: Vec<u8>, previous: Vec<u8>) -> Result<(), google_pay_decrypt::ContextError> {
//! let context = GooglePaymentMethodTokenContext::new(vec![
//!     MerchantConfig::new(active).with_identifier("active"),
//!     MerchantConfig::new(previous).with_identifier("previous"),
//! ])?;
//! let message = context.decrypt_json(token_json)?;
//! println!("{}", message.message_id);
//! # Ok(())
//! # }
//! ```
//!
//! Signature verification of the token envelope is not performed here.

pub mod context;
pub mod error;
pub mod strategy;
pub mod types;

pub use context::{ContextOptions, GooglePaymentMethodTokenContext, MerchantConfig};
pub use error::{ContextError, DecryptionError, MerchantFailure};
pub use strategy::{DecryptionStrategy, EcV2DecryptionStrategy};
pub use types::{
    AuthMethod, DecryptedMessage, IntermediateSigningKey, PaymentMethod, PaymentMethodDetails,
    PaymentMethodToken, ProtocolVersion, SignedKey, SignedMessage,
};

pub const SENDER_ID: &[u8] = b"Google";
pub const PROTOCOL: &str = "ECv2";
pub const BASE64_ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;
