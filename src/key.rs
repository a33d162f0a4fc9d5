use std::fmt;

use const_oid::ObjectIdentifier;
use const_oid::db::rfc5912;
use der::Encode;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, PrivateKeyInfo};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1v15::{
    Signature as RsaSignature, SigningKey as RsaSigningKey, VerifyingKey as RsaVerifyingKey,
};
use rsa::signature::hazmat::PrehashVerifier;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tracing::{debug, instrument};
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::SignatureAlgorithm;
use crate::error::{CertMgrError, Result};

/// PEM label of a PKCS#8 private key.
pub const PRIVATE_KEY_PEM_LABEL: &str = "PRIVATE KEY";

/// Modulus sizes of the two supported RSA key lengths, in bytes.
const RSA_2048_BYTES: usize = 256;
const RSA_4096_BYTES: usize = 512;

/// The closed set of key algorithms a key pair can be generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Rsa2048,
    Rsa4096,
    EcdsaP256,
    EcdsaP384,
}

impl KeyAlgorithm {
    /// Resolves a key type (`rsa` or `ecc`) and a size or curve name.
    ///
    /// `default` selects RSA-2048 for `rsa` and secp256r1 for `ecc`.
    pub fn from_type_and_size(key_type: &str, size: &str) -> Result<Self> {
        match key_type {
            "rsa" => match size {
                "default" | "2048" => Ok(Self::Rsa2048),
                "4096" => Ok(Self::Rsa4096),
                _ => Err(CertMgrError::UnsupportedParameter(format!(
                    "unknown key size for rsa {size}"
                ))),
            },
            "ecc" => match size {
                "default" | "secp256r1" => Ok(Self::EcdsaP256),
                "secp384r1" => Ok(Self::EcdsaP384),
                _ => Err(CertMgrError::UnsupportedParameter(format!(
                    "unknown key size for ecc {size}"
                ))),
            },
            _ => Err(CertMgrError::UnsupportedParameter(format!(
                "unknown key type {key_type}"
            ))),
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa2048 => write!(f, "rsa-2048"),
            Self::Rsa4096 => write!(f, "rsa-4096"),
            Self::EcdsaP256 => write!(f, "ecc-secp256r1"),
            Self::EcdsaP384 => write!(f, "ecc-secp384r1"),
        }
    }
}

/// A private key of one of the [`KeyAlgorithm`]s.
#[derive(Clone)]
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a fresh key pair from the OS random-number generator.
    ///
    /// RSA generation takes a noticeable amount of time, multiple seconds for
    /// 4096 bit keys in unoptimized builds.
    #[instrument(name = "generate_key_pair")]
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self> {
        let key_pair = match algorithm {
            KeyAlgorithm::Rsa2048 => Self::generate_rsa(2048)?,
            KeyAlgorithm::Rsa4096 => Self::generate_rsa(4096)?,
            KeyAlgorithm::EcdsaP256 => Self::generate_ecdsa_p256()?,
            KeyAlgorithm::EcdsaP384 => Self::generate_ecdsa_p384()?,
        };
        debug!(key.algorithm = %algorithm, "generated key pair");
        Ok(key_pair)
    }

    fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| CertMgrError::GenerationFailure(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    fn generate_ecdsa_p256() -> Result<Self> {
        let mut bytes = [0u8; 32];
        // Rejection sampling: out-of-range scalars are drawn again, RNG faults are not.
        let secret = loop {
            fill_random(&mut bytes)?;
            if let Ok(secret) = p256::SecretKey::from_slice(&bytes) {
                break secret;
            }
        };
        let signing_key = P256SigningKey::from(&secret);
        let verifying_key = *signing_key.verifying_key();
        Ok(KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        })
    }

    fn generate_ecdsa_p384() -> Result<Self> {
        let mut bytes = [0u8; 48];
        let secret = loop {
            fill_random(&mut bytes)?;
            if let Ok(secret) = p384::SecretKey::from_slice(&bytes) {
                break secret;
            }
        };
        let signing_key = P384SigningKey::from(&secret);
        let verifying_key = *signing_key.verifying_key();
        Ok(KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyPair::Rsa { public, .. } => match public.size() {
                RSA_4096_BYTES => KeyAlgorithm::Rsa4096,
                _ => KeyAlgorithm::Rsa2048,
            },
            KeyPair::EcdsaP256 { .. } => KeyAlgorithm::EcdsaP256,
            KeyPair::EcdsaP384 { .. } => KeyAlgorithm::EcdsaP384,
        }
    }

    /// Derives the public half of the key pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_key_pair(self)
    }

    /// The X.509 signature algorithm this key signs with.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            KeyPair::EcdsaP256 { .. } => SignatureAlgorithm::Sha256WithECDSA,
            KeyPair::EcdsaP384 { .. } => SignatureAlgorithm::Sha384WithECDSA,
        }
    }

    /// Signs `data`, returning the signature in its X.509 encoding
    /// (raw PKCS#1 v1.5 for RSA, DER `Ecdsa-Sig-Value` for ECDSA).
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyPair::Rsa { private, .. } => {
                let signing_key = RsaSigningKey::<Sha256>::new((**private).clone());
                let signature = signing_key.try_sign(data).map_err(signing_failure)?;
                Ok(signature.to_vec())
            }
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: p256::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_failure)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let signature: p384::ecdsa::Signature =
                    signing_key.try_sign(data).map_err(signing_failure)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Encodes the private key as PKCS#8 DER, the container shared by all key types.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let document = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der(),
            KeyPair::EcdsaP256 { signing_key, .. } => {
                p256::SecretKey::from(signing_key).to_pkcs8_der()
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                p384::SecretKey::from(signing_key).to_pkcs8_der()
            }
        }
        .map_err(|e| CertMgrError::EncodingFailure(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// Decodes a PKCS#8 DER private key.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info =
            PrivateKeyInfo::try_from(der).map_err(|e| CertMgrError::MalformedKey(e.to_string()))?;
        let malformed = |e: pkcs8::Error| CertMgrError::MalformedKey(e.to_string());

        match info.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der).map_err(malformed)?;
                if !matches!(private.size(), RSA_2048_BYTES | RSA_4096_BYTES) {
                    return Err(CertMgrError::UnsupportedKeyType(format!(
                        "rsa-{} private key",
                        private.size() * 8
                    )));
                }
                let public = RsaPublicKey::from(&private);
                Ok(KeyPair::Rsa {
                    private: Box::new(private),
                    public,
                })
            }
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = info
                    .algorithm
                    .parameters
                    .map(|params| params.decode_as::<ObjectIdentifier>())
                    .transpose()
                    .map_err(|e| CertMgrError::MalformedKey(e.to_string()))?;
                match curve {
                    Some(rfc5912::SECP_256_R_1) => {
                        let secret = p256::SecretKey::from_pkcs8_der(der).map_err(malformed)?;
                        let signing_key = P256SigningKey::from(&secret);
                        let verifying_key = *signing_key.verifying_key();
                        Ok(KeyPair::EcdsaP256 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    Some(rfc5912::SECP_384_R_1) => {
                        let secret = p384::SecretKey::from_pkcs8_der(der).map_err(malformed)?;
                        let signing_key = P384SigningKey::from(&secret);
                        let verifying_key = *signing_key.verifying_key();
                        Ok(KeyPair::EcdsaP384 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    other => Err(CertMgrError::UnsupportedKeyType(format!(
                        "elliptic curve {other:?}"
                    ))),
                }
            }
            oid => Err(CertMgrError::UnsupportedKeyType(format!(
                "private key algorithm {oid}"
            ))),
        }
    }
}

fn fill_random(bytes: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(bytes)
        .map_err(|e| CertMgrError::GenerationFailure(e.to_string()))
}

fn signing_failure(err: rsa::signature::Error) -> CertMgrError {
    CertMgrError::SigningFailure(err.to_string())
}

fn invalid_signature(err: impl fmt::Display) -> CertMgrError {
    CertMgrError::InvalidSignature(err.to_string())
}

/// The public half of a [`KeyPair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        match key_pair {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
        }
    }

    /// Wraps the key into a `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone()),
            PublicKey::EcdsaP256(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)
            }
            PublicKey::EcdsaP384(verifying_key) => {
                SubjectPublicKeyInfoOwned::from_key(*verifying_key)
            }
        }?;
        Ok(spki)
    }

    /// DER encoding of the `SubjectPublicKeyInfo`.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_spki()?.to_der()?)
    }

    /// Extracts the key from an X.509 `SubjectPublicKeyInfo`.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = spki.to_der()?;
        let malformed = |e: x509_cert::spki::Error| CertMgrError::MalformedKey(e.to_string());

        match spki.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => RsaPublicKey::from_public_key_der(&der)
                .map(PublicKey::Rsa)
                .map_err(malformed),
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .map(|params| params.decode_as::<ObjectIdentifier>())
                    .transpose()
                    .map_err(|e| CertMgrError::MalformedKey(e.to_string()))?;
                match curve {
                    Some(rfc5912::SECP_256_R_1) => P256VerifyingKey::from_public_key_der(&der)
                        .map(PublicKey::EcdsaP256)
                        .map_err(malformed),
                    Some(rfc5912::SECP_384_R_1) => P384VerifyingKey::from_public_key_der(&der)
                        .map(PublicKey::EcdsaP384)
                        .map_err(malformed),
                    other => Err(CertMgrError::UnsupportedKeyType(format!(
                        "elliptic curve {other:?}"
                    ))),
                }
            }
            oid => Err(CertMgrError::UnsupportedKeyType(format!(
                "public key algorithm {oid}"
            ))),
        }
    }

    /// SHA-1 over the public key bits, as used for subject and authority key identifiers.
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
    }

    /// Verifies `signature` over `data` under the declared `algorithm`.
    ///
    /// ECDSA signatures are checked against a prehash, so a P-384 key may carry
    /// a SHA-256 signature (and the reverse) as other tools sometimes produce.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        match (self, algorithm) {
            (PublicKey::Rsa(public), SignatureAlgorithm::Sha256WithRSA) => {
                let verifying_key = RsaVerifyingKey::<Sha256>::new(public.clone());
                let signature = RsaSignature::try_from(signature).map_err(invalid_signature)?;
                verifying_key
                    .verify(data, &signature)
                    .map_err(invalid_signature)
            }
            (PublicKey::EcdsaP256(verifying_key), algorithm) if algorithm.is_ecdsa() => {
                let signature =
                    p256::ecdsa::Signature::from_der(signature).map_err(invalid_signature)?;
                verifying_key
                    .verify_prehash(&algorithm.digest(data), &signature)
                    .map_err(invalid_signature)
            }
            (PublicKey::EcdsaP384(verifying_key), algorithm) if algorithm.is_ecdsa() => {
                let signature =
                    p384::ecdsa::Signature::from_der(signature).map_err(invalid_signature)?;
                verifying_key
                    .verify_prehash(&algorithm.digest(data), &signature)
                    .map_err(invalid_signature)
            }
            (public_key, algorithm) => Err(CertMgrError::InvalidSignature(format!(
                "{algorithm:?} cannot be used with a {} key",
                public_key.algorithm_name()
            ))),
        }
    }

    fn algorithm_name(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "RSA",
            PublicKey::EcdsaP256(_) => "P-256",
            PublicKey::EcdsaP384(_) => "P-384",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_ALGORITHMS: [KeyAlgorithm; 4] = [
        KeyAlgorithm::Rsa2048,
        KeyAlgorithm::Rsa4096,
        KeyAlgorithm::EcdsaP256,
        KeyAlgorithm::EcdsaP384,
    ];

    #[test]
    fn test_key_algorithm_from_type_and_size() {
        let cases = [
            ("rsa", "default", KeyAlgorithm::Rsa2048),
            ("rsa", "2048", KeyAlgorithm::Rsa2048),
            ("rsa", "4096", KeyAlgorithm::Rsa4096),
            ("ecc", "default", KeyAlgorithm::EcdsaP256),
            ("ecc", "secp256r1", KeyAlgorithm::EcdsaP256),
            ("ecc", "secp384r1", KeyAlgorithm::EcdsaP384),
        ];
        for (key_type, size, expected) in cases {
            assert_eq!(
                KeyAlgorithm::from_type_and_size(key_type, size).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_key_algorithm_rejects_unknown_parameters() {
        for (key_type, size) in [
            ("rsa", "1024"),
            ("rsa", "secp256r1"),
            ("ecc", "2048"),
            ("ecc", "secp521r1"),
            ("ed25519", "default"),
        ] {
            let err = KeyAlgorithm::from_type_and_size(key_type, size).unwrap_err();
            assert!(
                matches!(err, CertMgrError::UnsupportedParameter(_)),
                "{key_type}/{size}: {err}"
            );
        }
    }

    #[test]
    fn test_pkcs8_round_trip_keeps_public_key() {
        for algorithm in ALL_ALGORITHMS {
            let key_pair = KeyPair::generate(algorithm).unwrap();
            assert_eq!(key_pair.algorithm(), algorithm);

            let der = key_pair.to_pkcs8_der().unwrap();
            let decoded = KeyPair::from_pkcs8_der(&der).unwrap();

            assert_eq!(decoded.algorithm(), algorithm);
            assert_eq!(
                decoded.public_key().to_der().unwrap(),
                key_pair.public_key().to_der().unwrap()
            );
        }
    }

    #[test]
    fn test_malformed_pkcs8_is_rejected() {
        let err = KeyPair::from_pkcs8_der(b"definitely not a key").unwrap_err();
        assert!(matches!(err, CertMgrError::MalformedKey(_)));
    }

    #[test]
    fn test_pkcs8_rejects_other_rsa_sizes() {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).unwrap();
        let der = private.to_pkcs8_der().unwrap();
        let err = KeyPair::from_pkcs8_der(der.as_bytes()).unwrap_err();
        assert!(
            matches!(&err, CertMgrError::UnsupportedKeyType(msg) if msg.contains("rsa-1024")),
            "{err}"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcdsaP256, KeyAlgorithm::EcdsaP384] {
            let key_pair = KeyPair::generate(algorithm).unwrap();
            let signature = key_pair.sign_data(b"to be signed").unwrap();
            let public_key = key_pair.public_key();
            let algorithm = key_pair.signature_algorithm();

            public_key.verify(algorithm, b"to be signed", &signature).unwrap();
            let err = public_key
                .verify(algorithm, b"tampered", &signature)
                .unwrap_err();
            assert!(matches!(err, CertMgrError::InvalidSignature(_)));
        }
    }

    #[test]
    fn test_verify_rejects_mismatched_algorithm() {
        let key_pair = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let signature = key_pair.sign_data(b"data").unwrap();
        let err = key_pair
            .public_key()
            .verify(SignatureAlgorithm::Sha256WithRSA, b"data", &signature)
            .unwrap_err();
        assert!(matches!(err, CertMgrError::InvalidSignature(_)));
    }

    #[test]
    fn test_public_key_spki_round_trip() {
        let key_pair = KeyPair::generate(KeyAlgorithm::EcdsaP384).unwrap();
        let spki = key_pair.public_key().to_spki().unwrap();
        let public_key = PublicKey::from_x509spki(&spki).unwrap();
        assert_eq!(public_key, key_pair.public_key());
        assert_eq!(public_key.key_identifier().unwrap().len(), 20);
    }
}
