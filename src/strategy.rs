use base64::Engine;
use openssl::bn::BigNumContext;
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, EcPoint};
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::symm::{decrypt, Cipher};
use ring::hmac;
use rust_hkdf::Hkdf;
use sha2::Sha256;
use tracing::debug;

use crate::error::DecryptionError;
use crate::types::{DecryptedMessage, SignedMessage};
use crate::{BASE64_ENGINE, SENDER_ID};

/// Length of an uncompressed P-256 point: `0x04 || X || Y`.
pub const UNCOMPRESSED_POINT_LEN: usize = 65;

const SYMMETRIC_KEY_LEN: usize = 32;
const MAC_KEY_LEN: usize = 32;
const HKDF_SALT: [u8; 32] = [0u8; 32];
const CTR_IV: [u8; 16] = [0u8; 16];

/// A protocol-specific way of opening a `signedMessage` with one private key.
pub trait DecryptionStrategy {
    fn decrypt(&self, signed_message: &str) -> Result<DecryptedMessage, DecryptionError>;
}

/// ECv2: ECDH on P-256, HKDF-SHA256, HMAC-SHA256 tag, AES-256-CTR payload.
pub struct EcV2DecryptionStrategy {
    private_key: PKey<Private>,
}

impl std::fmt::Debug for EcV2DecryptionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcV2DecryptionStrategy").finish_non_exhaustive()
    }
}

// signedMessage with its binary fields decoded
struct DecodedMessage {
    encrypted_message: Vec<u8>,
    ephemeral_public_key: Vec<u8>,
    tag: String,
}

// Keys derived for exactly one message. They are consumed by `open`, so the
// zero counter block is never reused with the same key.
struct DerivedKeys {
    symmetric_encryption_key: [u8; SYMMETRIC_KEY_LEN],
    mac_key: [u8; MAC_KEY_LEN],
}

impl EcV2DecryptionStrategy {
    /// Accepts a PKCS#8 (`BEGIN PRIVATE KEY`) or SEC1 (`BEGIN EC PRIVATE KEY`) PEM.
    pub fn from_pem(private_key_pem: &[u8]) -> Result<Self, DecryptionError> {
        let private_key = PKey::private_key_from_pem(private_key_pem)
            .map_err(|err| DecryptionError::KeyParse(err.to_string()))?;
        Self::from_private_key(private_key)
    }

    /// Accepts the base64 PKCS#8 DER string exported by the Google Pay console.
    pub fn from_pkcs8_base64(private_key: &[u8]) -> Result<Self, DecryptionError> {
        let encoded = std::str::from_utf8(private_key)
            .map_err(|_| DecryptionError::KeyParse("private key is not valid UTF-8".to_string()))?;
        let der = BASE64_ENGINE
            .decode(encoded.trim())
            .map_err(|err| DecryptionError::KeyParse(err.to_string()))?;
        let private_key = PKey::private_key_from_pkcs8(&der)
            .map_err(|err| DecryptionError::KeyParse(err.to_string()))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: PKey<Private>) -> Result<Self, DecryptionError> {
        let ec_key = private_key
            .ec_key()
            .map_err(|_| DecryptionError::KeyParse("not an elliptic curve key".to_string()))?;

        // only prime256v1 is valid for ECv2
        if ec_key.group().curve_name() != Some(Nid::X9_62_PRIME256V1) {
            return Err(DecryptionError::KeyParse(
                "private key is not on curve prime256v1".to_string(),
            ));
        }
        ec_key
            .check_key()
            .map_err(|err| DecryptionError::KeyParse(err.to_string()))?;

        Ok(Self { private_key })
    }

    // Parse the signed message and base64 decode its binary fields
    fn decode_signed_message(signed_message: &str) -> Result<DecodedMessage, DecryptionError> {
        let signed_message: SignedMessage = serde_json::from_str(signed_message)
            .map_err(|err| DecryptionError::MalformedMessage(err.to_string()))?;

        let encrypted_message = BASE64_ENGINE
            .decode(&signed_message.encrypted_message)
            .map_err(|_| DecryptionError::MalformedMessage("encryptedMessage is not base64".to_string()))?;
        let ephemeral_public_key = BASE64_ENGINE
            .decode(&signed_message.ephemeral_public_key)
            .map_err(|_| {
                DecryptionError::MalformedMessage("ephemeralPublicKey is not base64".to_string())
            })?;

        Ok(DecodedMessage {
            encrypted_message,
            ephemeral_public_key,
            tag: signed_message.tag,
        })
    }

    // Derive the shared secret using ECDH with the sender's ephemeral key
    fn get_shared_key(&self, ephemeral_public_key: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let agreement = |err: openssl::error::ErrorStack| DecryptionError::KeyAgreement(err.to_string());

        if ephemeral_public_key.len() != UNCOMPRESSED_POINT_LEN || ephemeral_public_key[0] != 0x04 {
            return Err(DecryptionError::KeyAgreement(format!(
                "expected a {UNCOMPRESSED_POINT_LEN} byte uncompressed point, got {} bytes",
                ephemeral_public_key.len()
            )));
        }

        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).map_err(agreement)?;
        let mut big_num_context = BigNumContext::new().map_err(agreement)?;

        // from_bytes rejects points that are not on the curve
        let point =
            EcPoint::from_bytes(&group, ephemeral_public_key, &mut big_num_context).map_err(agreement)?;
        let ephemeral_key = EcKey::from_public_key(&group, &point).map_err(agreement)?;
        ephemeral_key.check_key().map_err(agreement)?;
        let ephemeral_pkey = PKey::from_ec_key(ephemeral_key).map_err(agreement)?;

        let mut deriver = Deriver::new(&self.private_key).map_err(agreement)?;
        deriver.set_peer(&ephemeral_pkey).map_err(agreement)?;
        deriver.derive_to_vec().map_err(agreement)
    }

    fn derive_keys_for(&self, message: &DecodedMessage) -> Result<DerivedKeys, DecryptionError> {
        let shared_key = self.get_shared_key(&message.ephemeral_public_key)?;
        derive_keys(&message.ephemeral_public_key, &shared_key)
    }
}

// HKDF-SHA256 over ephemeral public key || shared secret, salt of 32 zero bytes,
// info "Google". The first half is the AES key, the second the HMAC key.
fn derive_keys(ephemeral_public_key: &[u8], shared_key: &[u8]) -> Result<DerivedKeys, DecryptionError> {
    let input_key_material = [ephemeral_public_key, shared_key].concat();
    let hkdf: Hkdf<Sha256> = Hkdf::new(Some(&HKDF_SALT[..]), &input_key_material);

    let mut okm = [0u8; SYMMETRIC_KEY_LEN + MAC_KEY_LEN];
    hkdf.expand(SENDER_ID, &mut okm)
        .map_err(|_| DecryptionError::KeyDerivation)?;

    let mut keys = DerivedKeys {
        symmetric_encryption_key: [0u8; SYMMETRIC_KEY_LEN],
        mac_key: [0u8; MAC_KEY_LEN],
    };
    keys.symmetric_encryption_key
        .copy_from_slice(&okm[..SYMMETRIC_KEY_LEN]);
    keys.mac_key.copy_from_slice(&okm[SYMMETRIC_KEY_LEN..]);
    Ok(keys)
}

impl DerivedKeys {
    // Verify the tag, then decrypt. Nothing is decrypted unless the tag matches.
    fn open(self, encrypted_message: &[u8], tag: &str) -> Result<Vec<u8>, DecryptionError> {
        self.verify_tag(encrypted_message, tag)?;
        decrypt(
            Cipher::aes_256_ctr(),
            &self.symmetric_encryption_key,
            Some(&CTR_IV[..]),
            encrypted_message,
        )
        .map_err(|err| DecryptionError::Cipher(err.to_string()))
    }

    fn verify_tag(&self, encrypted_message: &[u8], tag: &str) -> Result<(), DecryptionError> {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, &self.mac_key);
        let calculated = BASE64_ENGINE.encode(hmac::sign(&hmac_key, encrypted_message));

        // memcmp::eq is constant time but requires equal lengths
        if calculated.len() != tag.len()
            || !openssl::memcmp::eq(calculated.as_bytes(), tag.as_bytes())
        {
            return Err(DecryptionError::TagVerification);
        }
        Ok(())
    }
}

impl DecryptionStrategy for EcV2DecryptionStrategy {
    fn decrypt(&self, signed_message: &str) -> Result<DecryptedMessage, DecryptionError> {
        let message = Self::decode_signed_message(signed_message)?;
        let keys = self.derive_keys_for(&message)?;

        let plaintext = keys.open(&message.encrypted_message, &message.tag)?;
        debug!(bytes = plaintext.len(), "decrypted ECv2 signed message");

        serde_json::from_slice(&plaintext)
            .map_err(|err| DecryptionError::PayloadDecode(err.to_string()))
    }
}
