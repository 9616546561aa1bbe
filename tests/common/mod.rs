#![allow(dead_code)]

use std::path::PathBuf;

use base64::Engine;
use google_pay_decrypt::{PaymentMethodToken, BASE64_ENGINE};
use openssl::bn::BigNumContext;
use openssl::derive::Deriver;
use openssl::ec::{EcGroup, EcKey, PointConversionForm};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::symm::{encrypt, Cipher};
use rust_hkdf::Hkdf;
use sha2::Sha256;

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture(name)).unwrap()
}

pub fn token_fixture(name: &str) -> PaymentMethodToken {
    serde_json::from_slice(&read_fixture(name)).unwrap()
}

pub fn json_fixture(name: &str) -> serde_json::Value {
    serde_json::from_slice(&read_fixture(name)).unwrap()
}

/// A freshly generated P-256 merchant key.
pub struct MerchantKey {
    key: EcKey<Private>,
}

impl MerchantKey {
    pub fn generate() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        Self {
            key: EcKey::generate(&group).unwrap(),
        }
    }

    pub fn pem(&self) -> Vec<u8> {
        PKey::from_ec_key(self.key.clone())
            .unwrap()
            .private_key_to_pem_pkcs8()
            .unwrap()
    }

    /// Encrypts `plaintext` to this key the way Google Pay does and returns the
    /// `signedMessage` fields as raw bytes.
    pub fn seal_raw(&self, plaintext: &[u8]) -> SealedParts {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let mut ctx = BigNumContext::new().unwrap();

        let ephemeral = EcKey::generate(&group).unwrap();
        let ephemeral_public_key = ephemeral
            .public_key()
            .to_bytes(&group, PointConversionForm::UNCOMPRESSED, &mut ctx)
            .unwrap();

        let recipient = PKey::from_ec_key(
            EcKey::from_public_key(&group, self.key.public_key()).unwrap(),
        )
        .unwrap();
        let ephemeral = PKey::from_ec_key(ephemeral).unwrap();
        let mut deriver = Deriver::new(&ephemeral).unwrap();
        deriver.set_peer(&recipient).unwrap();
        let shared = deriver.derive_to_vec().unwrap();

        let mut okm = [0u8; 64];
        Hkdf::<Sha256>::new(Some(&[0u8; 32][..]), &[ephemeral_public_key.as_slice(), shared.as_slice()].concat())
            .expand(b"Google", &mut okm)
            .unwrap();

        let encrypted_message =
            encrypt(Cipher::aes_256_ctr(), &okm[..32], Some(&[0u8; 16][..]), plaintext).unwrap();

        let mac_key = PKey::hmac(&okm[32..]).unwrap();
        let mut signer = Signer::new(MessageDigest::sha256(), &mac_key).unwrap();
        signer.update(&encrypted_message).unwrap();
        let tag = signer.sign_to_vec().unwrap();

        SealedParts {
            encrypted_message,
            ephemeral_public_key,
            tag,
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> PaymentMethodToken {
        self.seal_raw(plaintext).into_token()
    }
}

pub struct SealedParts {
    pub encrypted_message: Vec<u8>,
    pub ephemeral_public_key: Vec<u8>,
    pub tag: Vec<u8>,
}

impl SealedParts {
    pub fn signed_message(&self) -> String {
        serde_json::json!({
            "encryptedMessage": BASE64_ENGINE.encode(&self.encrypted_message),
            "ephemeralPublicKey": BASE64_ENGINE.encode(&self.ephemeral_public_key),
            "tag": BASE64_ENGINE.encode(&self.tag),
        })
        .to_string()
    }

    pub fn into_token(self) -> PaymentMethodToken {
        PaymentMethodToken {
            protocol_version: "ECv2".to_string(),
            signature: String::new(),
            intermediate_signing_key: Default::default(),
            signed_message: self.signed_message(),
        }
    }
}
