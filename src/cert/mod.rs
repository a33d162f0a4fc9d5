pub mod extensions;
pub mod params;
pub mod template;

use der::asn1::Any;
use der::{Decode, Encode, Tag};
use extensions::{
    BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier, ToAndFromX509Extension,
};
use params::{DistinguishedName, Validity};
use sha2::{Digest, Sha256, Sha384};
use template::CertificateTemplate;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{CertMgrError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils;
use crate::tbs_certificate::from_x509_time;

/// PEM label of an X.509 certificate.
pub const CERTIFICATE_PEM_LABEL: &str = "CERTIFICATE";

/// Signature algorithms certmgr signs and verifies with.
///
/// RSA keys always sign with SHA-256. ECDSA keys use the digest matching their curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-256 with RSA encryption (PKCS#1 v1.5).
    Sha256WithRSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
}

impl SignatureAlgorithm {
    /// Builds the `AlgorithmIdentifier` for this algorithm.
    ///
    /// RSA carries an explicit NULL parameter, ECDSA none.
    pub fn to_algorithm_identifier(self) -> Result<AlgorithmIdentifierOwned> {
        let identifier = match self {
            SignatureAlgorithm::Sha256WithRSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: Some(Any::new(Tag::Null, Vec::<u8>::new())?),
            },
            SignatureAlgorithm::Sha256WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            SignatureAlgorithm::Sha384WithECDSA => AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_384,
                parameters: None,
            },
        };
        Ok(identifier)
    }

    /// Determines the signature algorithm from its `AlgorithmIdentifier`.
    pub fn from_algorithm_identifier(identifier: &AlgorithmIdentifierOwned) -> Result<Self> {
        match identifier.oid {
            const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION => {
                Ok(SignatureAlgorithm::Sha256WithRSA)
            }
            const_oid::db::rfc5912::ECDSA_WITH_SHA_256 => Ok(SignatureAlgorithm::Sha256WithECDSA),
            const_oid::db::rfc5912::ECDSA_WITH_SHA_384 => Ok(SignatureAlgorithm::Sha384WithECDSA),
            oid => Err(CertMgrError::InvalidSignature(format!(
                "unsupported signature algorithm {oid}"
            ))),
        }
    }

    pub fn is_ecdsa(self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Sha256WithECDSA | SignatureAlgorithm::Sha384WithECDSA
        )
    }

    /// Hashes `data` with the digest this algorithm signs over.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            SignatureAlgorithm::Sha256WithRSA | SignatureAlgorithm::Sha256WithECDSA => {
                Sha256::digest(data).to_vec()
            }
            SignatureAlgorithm::Sha384WithECDSA => Sha384::digest(data).to_vec(),
        }
    }
}

/// An issued or loaded X.509 certificate.
///
/// The accessors read back the fields and extensions certmgr itself writes.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Decoded `x509-cert` structure.
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    /// PEM with the `CERTIFICATE` label.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CERTIFICATE_PEM_LABEL))
    }

    /// Parses a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)
            .map_err(|e| CertMgrError::MalformedCertificate(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Issues `template` with `key` as both subject key and signing key.
    /// The issuer name equals the subject name.
    pub fn new_self_signed(template: &CertificateTemplate, key: &KeyPair) -> Result<Self> {
        let self_issuer = SelfIssuer {
            name: template.subject_name.clone(),
            key,
        };
        self_issuer.issue(template, &key.public_key())
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn subject_name(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer_name(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    /// Content octets of the serial number.
    pub fn serial_number(&self) -> &[u8] {
        self.inner.tbs_certificate.serial_number.as_bytes()
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: from_x509_time(&validity.not_before),
            not_after: from_x509_time(&validity.not_after),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// Looks up and decodes extension `E`, with its critical flag.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<(bool, E)>> {
        let Some(extensions) = &self.inner.tbs_certificate.extensions else {
            return Ok(None);
        };
        extensions
            .iter()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| {
                E::from_x509_extension_value(ext.extn_value.as_bytes())
                    .map(|value| (ext.critical, value))
                    .map_err(|e| CertMgrError::MalformedCertificate(e.to_string()))
            })
            .transpose()
    }

    pub fn basic_constraints(&self) -> Result<Option<BasicConstraints>> {
        Ok(self.extension::<BasicConstraints>()?.map(|(_, bc)| bc))
    }

    pub fn is_ca(&self) -> Result<bool> {
        Ok(self.basic_constraints()?.is_some_and(|bc| bc.is_ca))
    }

    pub fn key_usage(&self) -> Result<Option<KeyUsage>> {
        Ok(self.extension::<KeyUsage>()?.map(|(_, ku)| ku))
    }

    pub fn extended_key_usage(&self) -> Result<Vec<ExtendedKeyUsageOption>> {
        Ok(self
            .extension::<ExtendedKeyUsage>()?
            .map(|(_, eku)| eku.usage)
            .unwrap_or_default())
    }

    pub fn dns_names(&self) -> Result<Vec<String>> {
        Ok(self
            .extension::<SubjectAltName>()?
            .map(|(_, san)| san.names)
            .unwrap_or_default())
    }

    /// Checks the certificate signature against `issuer_key`.
    pub fn verify_signed_by(&self, issuer_key: &PublicKey) -> Result<()> {
        let algorithm = SignatureAlgorithm::from_algorithm_identifier(&self.inner.signature_algorithm)?;
        let tbs = self.inner.tbs_certificate.to_der()?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CertMgrError::MalformedCertificate("signature has unused bits".to_string())
        })?;
        issuer_key.verify(algorithm, &tbs, signature)
    }
}

/// Issuer of a self-signed certificate: the subject signs for itself.
struct SelfIssuer<'a> {
    name: Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}

/// A stored certificate together with its private key, able to sign others.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> Name {
        // The name of the issuer is the subject of the certificate, copied as encoded
        self.cert.subject_name().clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    /// The certificate's own subject key identifier, so children chain to it
    /// even when another tool derived it differently.
    fn authority_key_identifier(&self) -> Result<Vec<u8>> {
        match self.cert.extension::<SubjectKeyIdentifier>()? {
            Some((_, ski)) => Ok(ski.0),
            None => self.key.public_key().key_identifier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use der::asn1::OctetString;

    use super::*;
    use crate::cert::extensions::AuthorityKeyIdentifier;
    use crate::cert::template::{CertificateRole, SignArgs};
    use crate::config::IdentityDefaults;
    use crate::key::KeyAlgorithm;

    fn template(role: CertificateRole, args: &SignArgs) -> CertificateTemplate {
        CertificateTemplate::build(role, args, &IdentityDefaults::default()).unwrap()
    }

    fn ca_signer() -> CertificateWithPrivateKey {
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let args = SignArgs::builder()
            .common_name("Foreign CA")
            .self_signed(true)
            .build();
        let cert = Certificate::new_self_signed(&template(CertificateRole::Ca, &args), &key).unwrap();
        CertificateWithPrivateKey { cert, key }
    }

    fn issue_leaf(signer: &CertificateWithPrivateKey) -> Certificate {
        let args = SignArgs::builder()
            .common_name("leaf")
            .signer("foreign")
            .build();
        let key = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        signer
            .issue(&template(CertificateRole::Server, &args), &key.public_key())
            .unwrap()
    }

    fn aki(cert: &Certificate) -> Vec<u8> {
        cert.extension::<AuthorityKeyIdentifier>()
            .unwrap()
            .unwrap()
            .1
            .key_identifier
    }

    #[test]
    fn test_authority_key_identifier_copies_signer_ski() {
        let mut signer = ca_signer();
        let custom_ski = vec![0xab; 8];
        let extensions = signer.cert.inner.tbs_certificate.extensions.as_mut().unwrap();
        let ski = extensions
            .iter_mut()
            .find(|ext| ext.extn_id == SubjectKeyIdentifier::OID)
            .unwrap();
        ski.extn_value = OctetString::new(
            SubjectKeyIdentifier(custom_ski.clone())
                .to_x509_extension_value()
                .unwrap(),
        )
        .unwrap();
        assert_ne!(custom_ski, signer.key.public_key().key_identifier().unwrap());

        assert_eq!(aki(&issue_leaf(&signer)), custom_ski);
    }

    #[test]
    fn test_authority_key_identifier_falls_back_to_key_hash() {
        let mut signer = ca_signer();
        signer
            .cert
            .inner
            .tbs_certificate
            .extensions
            .as_mut()
            .unwrap()
            .retain(|ext| ext.extn_id != SubjectKeyIdentifier::OID);

        assert_eq!(
            aki(&issue_leaf(&signer)),
            signer.key.public_key().key_identifier().unwrap()
        );
    }

    #[test]
    fn test_self_signed_aki_matches_own_ski() {
        let signer = ca_signer();
        let (_, ski) = signer.cert.extension::<SubjectKeyIdentifier>().unwrap().unwrap();
        assert_eq!(aki(&signer.cert), ski.0);
        signer.cert.verify_signed_by(&signer.key.public_key()).unwrap();
    }
}
