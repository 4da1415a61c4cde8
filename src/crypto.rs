//! Cryptographic primitives for VaultChain
//!
//! [`CryptoService`] owns the two process-lifetime keypairs (RSA for sealing
//! record contents, secp256k1 for signing them) and exposes the hashing,
//! asymmetric, symmetric and signature operations the ledger and its
//! collaborators use. All ciphertexts, keys and signatures cross the API
//! boundary as standard base64 text; digests as lowercase hex.

use crate::error::CryptoError;
use aes::cipher::{
    block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit,
};
use aes::{Aes128, Aes192, Aes256};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use md5::Md5;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::fmt;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub const DEFAULT_RSA_KEY_BITS: usize = 2048;
pub const MIN_RSA_KEY_BITS: usize = 1024;

/// Size of a freshly generated symmetric key (AES-256).
pub const SYMMETRIC_KEY_SIZE: usize = 32;
pub const IV_SIZE: usize = 16;
const AES_BLOCK_SIZE: usize = 16;

/// OAEP overhead with SHA-256 as both digest and MGF1 hash: 2 * 32 + 2.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Md5,
}

impl HashAlgorithm {
    /// Resolves an algorithm by its exact lowercase name. Anything else,
    /// including other spellings such as `"SHA512"`, falls back to SHA-256.
    pub fn from_name(name: &str) -> Self {
        match name {
            "sha512" => HashAlgorithm::Sha512,
            "md5" => HashAlgorithm::Md5,
            _ => HashAlgorithm::Sha256,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Md5 => "md5",
        }
    }
}

/// Hex digest of `data` under `algorithm`.
pub fn hash_hex(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::Sha256 => hex::encode(Sha256::digest(data)),
        HashAlgorithm::Sha512 => hex::encode(Sha512::digest(data)),
        HashAlgorithm::Md5 => hex::encode(Md5::digest(data)),
    }
}

/// Output of [`CryptoService::symmetric_encrypt`]. The service keeps none of
/// it; the caller must hold on to `key` and `iv` to decrypt later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymmetricCiphertext {
    pub ciphertext: String,
    pub iv: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct SigningKeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl SigningKeyPair {
    /// Generates a new random keypair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        SigningKeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a keypair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidLength {
                what: "secret key",
                expected: SECRET_KEY_SIZE.to_string(),
                got: bytes.len(),
            });
        }
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| CryptoError::Signing(format!("Invalid secret key bytes: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Compressed SEC1 encoding of the public key.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs the SHA-256 digest of `message`. RFC 6979 nonces make the
    /// signature deterministic for a given key and message.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], CryptoError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| CryptoError::Signing(format!("Failed to create message: {}", e)))?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies a compact ECDSA signature over the SHA-256 digest of `message`.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), CryptoError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CryptoError::InvalidLength {
            what: "public key",
            expected: PUBLIC_KEY_SIZE.to_string(),
            got: public_key_bytes.len(),
        });
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(CryptoError::InvalidLength {
            what: "signature",
            expected: COMPACT_SIGNATURE_SIZE.to_string(),
            got: signature_bytes.len(),
        });
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| CryptoError::Signing(format!("Invalid public key: {}", e)))?;
    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| CryptoError::Signing(format!("Failed to create message: {}", e)))?;
    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| CryptoError::Signing(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| CryptoError::Signing("Signature verification failed".to_string()))
}

/// Keyed cryptographic service shared by the ledger and its collaborators.
///
/// Keys are generated once at construction and never rotated. Every method
/// takes `&self`, so one instance is shared behind an `Arc`.
pub struct CryptoService {
    rsa_private: RsaPrivateKey,
    rsa_public: RsaPublicKey,
    signing: SigningKeyPair,
}

impl fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoService")
            .field("rsa_bits", &(self.rsa_public.size() * 8))
            .field("verifying_key", &self.verifying_key_hex())
            .finish_non_exhaustive()
    }
}

impl CryptoService {
    /// Creates a service with a 2048-bit RSA key and a fresh signing key.
    pub fn new() -> Result<Self, CryptoError> {
        Self::with_rsa_bits(DEFAULT_RSA_KEY_BITS)
    }

    pub fn with_rsa_bits(bits: usize) -> Result<Self, CryptoError> {
        if bits < MIN_RSA_KEY_BITS {
            return Err(CryptoError::KeyGeneration(format!(
                "RSA keys must be at least {} bits, got {}",
                MIN_RSA_KEY_BITS, bits
            )));
        }
        let rsa_private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let rsa_public = RsaPublicKey::from(&rsa_private);

        Ok(CryptoService {
            rsa_private,
            rsa_public,
            signing: SigningKeyPair::generate(),
        })
    }

    pub fn hash(&self, data: &str, algorithm: HashAlgorithm) -> String {
        hash_hex(data.as_bytes(), algorithm)
    }

    /// Largest plaintext, in bytes, that fits in one OAEP block.
    pub fn max_asymmetric_payload(&self) -> usize {
        self.rsa_public.size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    /// RSA-OAEP (SHA-256 digest and MGF1) encryption with the service's public key.
    pub fn asymmetric_encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let max = self.max_asymmetric_payload();
        if plaintext.len() > max {
            return Err(CryptoError::PayloadTooLarge {
                len: plaintext.len(),
                max,
            });
        }
        let ciphertext = self
            .rsa_public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext.as_bytes())
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;
        Ok(BASE64.encode(ciphertext))
    }

    pub fn asymmetric_decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let bytes = decode_base64(ciphertext, "ciphertext")?;
        let modulus_len = self.rsa_private.size();
        if bytes.len() != modulus_len {
            return Err(CryptoError::InvalidLength {
                what: "rsa ciphertext",
                expected: modulus_len.to_string(),
                got: bytes.len(),
            });
        }
        let plaintext = self
            .rsa_private
            .decrypt(Oaep::new::<Sha256>(), &bytes)
            .map_err(|e| CryptoError::Rsa(e.to_string()))?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    /// AES-CBC with PKCS#7 padding and a random IV per call. Without a key a
    /// fresh 256-bit key is generated; a supplied key may be 16, 24 or 32 bytes.
    pub fn symmetric_encrypt(
        &self,
        plaintext: &str,
        key: Option<&[u8]>,
    ) -> Result<SymmetricCiphertext, CryptoError> {
        let key = match key {
            Some(key) => key.to_vec(),
            None => {
                let mut generated = vec![0u8; SYMMETRIC_KEY_SIZE];
                OsRng.fill_bytes(&mut generated);
                generated
            }
        };
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let ciphertext = cbc_encrypt(&key, &iv, plaintext.as_bytes())?;
        Ok(SymmetricCiphertext {
            ciphertext: BASE64.encode(ciphertext),
            iv: BASE64.encode(iv),
            key: BASE64.encode(key),
        })
    }

    pub fn symmetric_decrypt(
        &self,
        ciphertext: &str,
        key: &str,
        iv: &str,
    ) -> Result<String, CryptoError> {
        let ciphertext = decode_base64(ciphertext, "ciphertext")?;
        let key = decode_base64(key, "key")?;
        let iv = decode_base64(iv, "iv")?;

        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidLength {
                what: "ciphertext",
                expected: format!("a non-zero multiple of {}", AES_BLOCK_SIZE),
                got: ciphertext.len(),
            });
        }

        let plaintext = cbc_decrypt(&key, &iv, &ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }

    pub fn sign(&self, data: &str) -> Result<String, CryptoError> {
        let signature = self.signing.sign(data.as_bytes())?;
        Ok(BASE64.encode(signature))
    }

    /// Checks `signature` against `data`. Malformed input is a `false`, never an error.
    pub fn verify(&self, data: &str, signature: &str) -> bool {
        let Ok(signature) = BASE64.decode(signature.trim()) else {
            return false;
        };
        verify_signature(&self.signing.public_key_bytes(), data.as_bytes(), &signature).is_ok()
    }

    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.signing.public_key_bytes())
    }

    pub fn rsa_public_key_pem(&self) -> Result<String, CryptoError> {
        self.rsa_public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Rsa(e.to_string()))
    }
}

fn decode_base64(input: &str, what: &'static str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(input.trim())
        .map_err(|_| CryptoError::InvalidBase64(what))
}

fn symmetric_key_length_error(got: usize) -> CryptoError {
    CryptoError::InvalidLength {
        what: "symmetric key",
        expected: "16, 24 or 32".to_string(),
        got,
    }
}

fn iv_length_error(got: usize) -> CryptoError {
    CryptoError::InvalidLength {
        what: "iv",
        expected: IV_SIZE.to_string(),
        got,
    }
}

fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key.len() {
        16 => cbc_encrypt_with::<Aes128>(key, iv, plaintext),
        24 => cbc_encrypt_with::<Aes192>(key, iv, plaintext),
        32 => cbc_encrypt_with::<Aes256>(key, iv, plaintext),
        got => Err(symmetric_key_length_error(got)),
    }
}

fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key.len() {
        16 => cbc_decrypt_with::<Aes128>(key, iv, ciphertext),
        24 => cbc_decrypt_with::<Aes192>(key, iv, ciphertext),
        32 => cbc_decrypt_with::<Aes256>(key, iv, ciphertext),
        got => Err(symmetric_key_length_error(got)),
    }
}

fn cbc_encrypt_with<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Encryptor::<C>::new_from_slices(key, iv).map_err(|_| iv_length_error(iv.len()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt_with<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: BlockDecryptMut + BlockCipher + KeyInit,
{
    let cipher = cbc::Decryptor::<C>::new_from_slices(key, iv).map_err(|_| iv_length_error(iv.len()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Padding)
}

/// One RSA key per test binary; generation dominates test time otherwise.
#[cfg(test)]
pub(crate) static TEST_SERVICE: Lazy<std::sync::Arc<CryptoService>> = Lazy::new(|| {
    std::sync::Arc::new(CryptoService::with_rsa_bits(MIN_RSA_KEY_BITS).expect("test key generation"))
});
