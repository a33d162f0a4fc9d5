use der::Encode;
use der::asn1::BitString;
use tracing::debug;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use crate::cert::params::ExtensionParam;
use crate::cert::template::CertificateTemplate;
use crate::error::Result;
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::TbsCertificate;

/// Anything that can sign certificates.
///
/// Implementors provide a name and a key. [`Issuer::issue`] builds the
/// extensions, signs and assembles the certificate.
pub trait Issuer {
    /// Returns the name written into the issuer field.
    fn issuer_name(&self) -> Name;

    /// Key the certificates are signed with.
    fn signing_key(&self) -> &KeyPair;

    /// Key identifier written into the authority key identifier of issued
    /// certificates. Defaults to the SHA-1 of the signing key.
    fn authority_key_identifier(&self) -> Result<Vec<u8>> {
        self.signing_key().public_key().key_identifier()
    }

    /// Issues a certificate for `subject_public_key` described by `template`.
    ///
    /// The signature algorithm follows the signing key: SHA-256 with RSA,
    /// SHA-256 with ECDSA on P-256, SHA-384 with ECDSA on P-384.
    fn issue(
        &self,
        template: &CertificateTemplate,
        subject_public_key: &PublicKey,
    ) -> Result<Certificate> {
        let signing_key = self.signing_key();
        let signature_algorithm = signing_key.signature_algorithm();

        let basic_constraints = BasicConstraints {
            is_ca: template.is_ca,
            max_path_length: template.max_path_length,
        };
        let subject_key_id = SubjectKeyIdentifier(subject_public_key.key_identifier()?);
        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: self.authority_key_identifier()?,
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(template.key_usage, true)?,
        ];

        if !template.extended_key_usage.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: template.extended_key_usage.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        if !template.dns_names.is_empty() {
            let subject_alt_name = SubjectAltName {
                names: template.dns_names.clone(),
            };
            extensions.push(ExtensionParam::from_extension(subject_alt_name, false)?);
        }

        extensions.push(ExtensionParam::from_extension(subject_key_id, false)?);
        extensions.push(ExtensionParam::from_extension(authority_key_id, false)?);

        let tbs_cert = TbsCertificate {
            serial_number: template.serial_number.clone(),
            signature_algorithm,
            issuer: self.issuer_name(),
            validity: template.validity.clone(),
            subject: template.subject_name.clone(),
            subject_public_key: subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;

        debug!(
            subject = %tbs_cert_inner.subject,
            issuer = %tbs_cert_inner.issuer,
            role = %template.role,
            algorithm = ?signature_algorithm,
            not_after = %template.validity.not_after,
            "signing certificate"
        );

        let signature = signing_key.sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm.to_algorithm_identifier()?,
            signature: BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}
