use der::asn1::BitString;
use der::{Decode, Encode};
use tracing::{debug, instrument};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use crate::cert::SignatureAlgorithm;
use crate::cert::params::DistinguishedName;
use crate::error::{CertMgrError, Result};
use crate::key::{KeyPair, PublicKey};

/// PEM label of a PKCS#10 certificate request.
pub const CERTIFICATE_REQUEST_PEM_LABEL: &str = "CERTIFICATE REQUEST";

/// A PKCS#10 certificate signing request.
///
/// Requests built here name only the common name. The rest of the subject is
/// filled in from the identity defaults when the request is signed.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub inner: CertReq,
}

impl CertificateRequest {
    /// Builds a request for `common_name`, signed by `key_pair`.
    #[instrument(skip(key_pair), fields(algorithm = %key_pair.algorithm()))]
    pub fn build(key_pair: &KeyPair, common_name: &str) -> Result<Self> {
        let subject = DistinguishedName::builder()
            .common_name(common_name)
            .build()
            .as_x509_name()?;

        let info = CertReqInfo {
            version: Version::V1,
            subject,
            public_key: key_pair.public_key().to_spki()?,
            attributes: Default::default(),
        };

        let signature_algorithm = key_pair.signature_algorithm();
        let signature = key_pair.sign_data(&info.to_der()?)?;
        debug!(subject = %info.subject, "signed certificate request");

        Ok(Self {
            inner: CertReq {
                info,
                algorithm: signature_algorithm.to_algorithm_identifier()?,
                signature: BitString::from_bytes(&signature)?,
            },
        })
    }

    /// Verifies the self-signature and returns the requested public key.
    pub fn validate(&self) -> Result<PublicKey> {
        let public_key = PublicKey::from_x509spki(&self.inner.info.public_key)
            .map_err(|e| CertMgrError::MalformedRequest(e.to_string()))?;
        let algorithm = SignatureAlgorithm::from_algorithm_identifier(&self.inner.algorithm)?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CertMgrError::MalformedRequest("signature has unused bits".to_string())
        })?;

        public_key.verify(algorithm, &self.inner.info.to_der()?, signature)?;
        Ok(public_key)
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_der()?)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner =
            CertReq::from_der(der).map_err(|e| CertMgrError::MalformedRequest(e.to_string()))?;
        Ok(Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyAlgorithm;

    #[test]
    fn test_build_and_validate() {
        for algorithm in [KeyAlgorithm::Rsa2048, KeyAlgorithm::EcdsaP256, KeyAlgorithm::EcdsaP384] {
            let key_pair = KeyPair::generate(algorithm).unwrap();
            let request = CertificateRequest::build(&key_pair, "leaf.example.com").unwrap();

            let decoded = CertificateRequest::from_der(&request.to_der().unwrap()).unwrap();
            assert_eq!(decoded.validate().unwrap(), key_pair.public_key());
            assert_eq!(
                decoded.subject(),
                DistinguishedName::builder()
                    .common_name("leaf.example.com")
                    .build()
            );
        }
    }

    #[test]
    fn test_tampered_request_fails_validation() {
        let key_pair = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let mut request = CertificateRequest::build(&key_pair, "honest").unwrap();
        request.inner.info.subject = DistinguishedName::builder()
            .common_name("forged")
            .build()
            .as_x509_name()
            .unwrap();

        let err = request.validate().unwrap_err();
        assert!(matches!(err, CertMgrError::InvalidSignature(_)));
    }

    #[test]
    fn test_request_with_foreign_key_fails_validation() {
        let key_pair = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let other = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let mut request = CertificateRequest::build(&key_pair, "swap").unwrap();
        request.inner.info.public_key = other.public_key().to_spki().unwrap();

        assert!(matches!(
            request.validate(),
            Err(CertMgrError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            CertificateRequest::from_der(&[0x30, 0x03, 0x02, 0x01, 0x00]),
            Err(CertMgrError::MalformedRequest(_))
        ));
    }
}
