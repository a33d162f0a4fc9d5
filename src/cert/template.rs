//! Role-driven certificate templates.
//!
//! A [`CertificateTemplate`] is everything needed to issue one certificate
//! except the subject public key and the signer. It is built from a
//! [`CertificateRole`], the per-invocation [`SignArgs`] and the configured
//! [`IdentityDefaults`], and lives only for a single signing call.

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use der::asn1::Ia5String;
use rand_core::{OsRng, RngCore};
use time::OffsetDateTime;
use x509_cert::name::Name;

use super::extensions::{ExtendedKeyUsageOption, FlagSet, KeyUsage, KeyUsages};
use super::params::{DistinguishedName, Validity, ValiditySpec};
use crate::config::IdentityDefaults;
use crate::error::{CertMgrError, Result};

/// Serial numbers carry this many random bytes.
const SERIAL_NUMBER_BYTES: usize = 16;

/// The kind of certificate being issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateRole {
    Ca,
    Server,
    Client,
}

impl CertificateRole {
    pub fn is_ca(self) -> bool {
        self == CertificateRole::Ca
    }

    /// Key usage bits granted to this role.
    pub fn key_usage(self) -> KeyUsage {
        let flags: FlagSet<KeyUsages> = match self {
            CertificateRole::Ca => KeyUsages::KeyCertSign | KeyUsages::CRLSign,
            CertificateRole::Server | CertificateRole::Client => {
                KeyUsages::KeyEncipherment | KeyUsages::DigitalSignature
            }
        };
        KeyUsage(flags)
    }

    pub fn extended_key_usage(self) -> Vec<ExtendedKeyUsageOption> {
        match self {
            CertificateRole::Ca => vec![],
            CertificateRole::Server => vec![ExtendedKeyUsageOption::ServerAuth],
            CertificateRole::Client => vec![ExtendedKeyUsageOption::ClientAuth],
        }
    }
}

impl FromStr for CertificateRole {
    type Err = CertMgrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ca" => Ok(CertificateRole::Ca),
            "server" => Ok(CertificateRole::Server),
            "client" => Ok(CertificateRole::Client),
            other => Err(CertMgrError::UnsupportedRole(other.to_string())),
        }
    }
}

impl fmt::Display for CertificateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CertificateRole::Ca => "ca",
            CertificateRole::Server => "server",
            CertificateRole::Client => "client",
        })
    }
}

/// Who signs the certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningMode {
    /// The subject key signs its own certificate.
    SelfSigned,
    /// The key and certificate stored under `signer` sign it.
    Chained { signer: String },
}

/// Per-invocation signing arguments.
#[derive(Debug, Clone, Builder)]
pub struct SignArgs {
    /// Common name of the subject.
    #[builder(into)]
    pub common_name: String,
    /// Comma-separated DNS names for the subject alternative name.
    #[builder(into)]
    pub dns_names: Option<String>,
    /// Basename of the signing key and certificate.
    #[builder(into)]
    pub signer: Option<String>,
    #[builder(default)]
    pub self_signed: bool,
    #[builder(default)]
    pub validity: ValiditySpec,
}

impl SignArgs {
    /// Resolves the signing mode. Only CA certificates may be self-signed.
    pub fn signing_mode(&self, role: CertificateRole) -> Result<SigningMode> {
        let signer = self.signer.as_deref().filter(|signer| !signer.is_empty());

        if self.self_signed {
            if !role.is_ca() {
                return Err(CertMgrError::InvalidSelfSignRequest(format!(
                    "only ca certificates can be self-signed, not {role}"
                )));
            }
            if let Some(signer) = signer {
                return Err(CertMgrError::ConflictingSigner(signer.to_string()));
            }
            return Ok(SigningMode::SelfSigned);
        }

        match signer {
            Some(signer) => Ok(SigningMode::Chained {
                signer: signer.to_string(),
            }),
            None => Err(CertMgrError::MissingSigner),
        }
    }

    /// DNS names split on `,`, with blank entries dropped.
    ///
    /// Names must fit an `IA5String`, so anything outside ASCII is rejected
    /// with [`CertMgrError::InvalidDnsName`].
    pub fn dns_name_list(&self) -> Result<Vec<String>> {
        self.dns_names
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| match Ia5String::new(name) {
                Ok(_) => Ok(name.to_string()),
                Err(_) => Err(CertMgrError::InvalidDnsName(name.to_string())),
            })
            .collect()
    }
}

/// A fully populated, not yet signed certificate description.
#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    pub role: CertificateRole,
    pub signing_mode: SigningMode,
    pub subject: DistinguishedName,
    /// `subject` as encoded into the certificate.
    pub subject_name: Name,
    pub validity: Validity,
    /// Content octets of a positive DER INTEGER.
    pub serial_number: Vec<u8>,
    pub is_ca: bool,
    /// `None` leaves the path length unconstrained.
    pub max_path_length: Option<u8>,
    pub key_usage: KeyUsage,
    pub extended_key_usage: Vec<ExtendedKeyUsageOption>,
    pub dns_names: Vec<String>,
}

impl CertificateTemplate {
    /// Builds a template valid from now.
    pub fn build(
        role: CertificateRole,
        args: &SignArgs,
        identity: &IdentityDefaults,
    ) -> Result<Self> {
        Self::build_at(role, args, identity, OffsetDateTime::now_utc())
    }

    /// Builds a template whose validity is measured from `now`.
    pub fn build_at(
        role: CertificateRole,
        args: &SignArgs,
        identity: &IdentityDefaults,
        now: OffsetDateTime,
    ) -> Result<Self> {
        let signing_mode = args.signing_mode(role)?;
        let subject = identity.subject(&args.common_name);
        let subject_name = subject.as_x509_name()?;
        let dns_names = args.dns_name_list()?;
        let validity = Validity::from_spec(now, args.validity)?;
        let serial_number = generate_serial_number()?;

        Ok(Self {
            role,
            signing_mode,
            subject,
            subject_name,
            validity,
            serial_number,
            is_ca: role.is_ca(),
            max_path_length: None,
            key_usage: role.key_usage(),
            extended_key_usage: role.extended_key_usage(),
            dns_names,
        })
    }
}

/// Draws a fresh random serial number of at most 128 bits.
pub fn generate_serial_number() -> Result<Vec<u8>> {
    let mut bytes = [0u8; SERIAL_NUMBER_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CertMgrError::SerialGenerationFailure(e.to_string()))?;
    Ok(positive_integer_bytes(&bytes))
}

/// Minimal big-endian encoding of the unsigned value in `bytes`, with a
/// leading zero when the high bit would otherwise make it negative.
fn positive_integer_bytes(bytes: &[u8]) -> Vec<u8> {
    let start = bytes
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(bytes.len().saturating_sub(1));
    let significant = &bytes[start..];

    let mut encoded = Vec::with_capacity(significant.len() + 1);
    if significant.first().is_some_and(|&b| b & 0x80 != 0) {
        encoded.push(0);
    }
    encoded.extend_from_slice(significant);
    if encoded.is_empty() {
        encoded.push(0);
    }
    encoded
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn identity() -> IdentityDefaults {
        IdentityDefaults {
            country: "NL".to_string(),
            organization: "Example Corp".to_string(),
            organizational_unit: String::new(),
            locality: "Amsterdam".to_string(),
            province: String::new(),
        }
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("ca".parse::<CertificateRole>().unwrap(), CertificateRole::Ca);
        assert_eq!(
            "server".parse::<CertificateRole>().unwrap(),
            CertificateRole::Server
        );
        assert_eq!(
            "client".parse::<CertificateRole>().unwrap(),
            CertificateRole::Client
        );
        for bad in ["CA", "intermediate", ""] {
            assert!(matches!(
                bad.parse::<CertificateRole>(),
                Err(CertMgrError::UnsupportedRole(_))
            ));
        }
    }

    #[test]
    fn test_usage_profiles() {
        let ca = CertificateRole::Ca;
        assert!(ca.is_ca());
        assert_eq!(ca.key_usage(), KeyUsage(KeyUsages::KeyCertSign | KeyUsages::CRLSign));
        assert!(ca.extended_key_usage().is_empty());

        let server = CertificateRole::Server;
        assert!(!server.is_ca());
        assert_eq!(
            server.key_usage(),
            KeyUsage(KeyUsages::KeyEncipherment | KeyUsages::DigitalSignature)
        );
        assert_eq!(
            server.extended_key_usage(),
            vec![ExtendedKeyUsageOption::ServerAuth]
        );
        assert_eq!(
            CertificateRole::Client.extended_key_usage(),
            vec![ExtendedKeyUsageOption::ClientAuth]
        );
    }

    #[test]
    fn test_self_signed_requires_ca_role() {
        let args = SignArgs::builder()
            .common_name("leaf")
            .self_signed(true)
            .build();
        for role in [CertificateRole::Server, CertificateRole::Client] {
            let err = CertificateTemplate::build(role, &args, &identity()).unwrap_err();
            assert!(matches!(err, CertMgrError::InvalidSelfSignRequest(_)));
        }
    }

    #[test]
    fn test_self_signed_rejects_signer() {
        let args = SignArgs::builder()
            .common_name("root")
            .self_signed(true)
            .signer("other")
            .build();
        let err = CertificateTemplate::build(CertificateRole::Ca, &args, &identity()).unwrap_err();
        assert!(matches!(err, CertMgrError::ConflictingSigner(signer) if signer == "other"));
    }

    #[test]
    fn test_chained_requires_signer() {
        for signer in [None, Some("")] {
            let args = SignArgs::builder()
                .common_name("leaf")
                .maybe_signer(signer)
                .build();
            let err = CertificateTemplate::build(CertificateRole::Server, &args, &identity())
                .unwrap_err();
            assert!(matches!(err, CertMgrError::MissingSigner));
        }
    }

    #[test]
    fn test_build_server_template() {
        let now = OffsetDateTime::now_utc();
        let args = SignArgs::builder()
            .common_name("leaf.example.com")
            .dns_names("leaf.example.com, www.example.com,,")
            .signer("root")
            .validity("90d".parse::<ValiditySpec>().unwrap())
            .build();
        let template =
            CertificateTemplate::build_at(CertificateRole::Server, &args, &identity(), now)
                .unwrap();

        assert_eq!(
            template.signing_mode,
            SigningMode::Chained {
                signer: "root".to_string()
            }
        );
        assert_eq!(template.subject.common_name, "leaf.example.com");
        assert_eq!(template.subject.country.as_deref(), Some("NL"));
        assert_eq!(template.subject.organization_unit, None);
        assert_eq!(
            template.dns_names,
            vec!["leaf.example.com".to_string(), "www.example.com".to_string()]
        );
        assert!(!template.is_ca);
        assert_eq!(template.validity.not_before, now - Duration::minutes(1));
        assert_eq!(template.validity.not_after, now + Duration::days(90));
    }

    #[test]
    fn test_dns_names_attached_for_ca() {
        let args = SignArgs::builder()
            .common_name("root")
            .self_signed(true)
            .dns_names("ca.example.com")
            .build();
        let template =
            CertificateTemplate::build(CertificateRole::Ca, &args, &identity()).unwrap();
        assert_eq!(template.dns_names, vec!["ca.example.com".to_string()]);
        assert_eq!(template.signing_mode, SigningMode::SelfSigned);
        assert_eq!(template.max_path_length, None);
    }

    #[test]
    fn test_non_ascii_dns_name_is_rejected_at_build() {
        let args = SignArgs::builder()
            .common_name("shop")
            .dns_names("shop.example, bücher.example")
            .signer("root")
            .build();
        let err = CertificateTemplate::build(CertificateRole::Server, &args, &identity())
            .unwrap_err();
        assert!(matches!(err, CertMgrError::InvalidDnsName(name) if name == "bücher.example"));
    }

    #[test]
    fn test_subject_is_encoded_at_build() {
        let args = SignArgs::builder()
            .common_name("root")
            .self_signed(true)
            .build();
        let template =
            CertificateTemplate::build(CertificateRole::Ca, &args, &identity()).unwrap();
        assert_eq!(template.subject_name, template.subject.as_x509_name().unwrap());

        let bad_country = IdentityDefaults {
            country: "N@".to_string(),
            ..identity()
        };
        let err =
            CertificateTemplate::build(CertificateRole::Ca, &args, &bad_country).unwrap_err();
        assert!(matches!(err, CertMgrError::EncodingFailure(_)), "{err}");
    }

    #[test]
    fn test_serial_numbers_are_positive_and_fresh() {
        let first = generate_serial_number().unwrap();
        let second = generate_serial_number().unwrap();
        assert_ne!(first, second);
        for serial in [first, second] {
            assert!(!serial.is_empty() && serial.len() <= SERIAL_NUMBER_BYTES + 1);
            assert_eq!(serial[0] & 0x80, 0);
        }
    }

    #[test]
    fn test_positive_integer_bytes() {
        assert_eq!(positive_integer_bytes(&[0, 0, 0]), vec![0]);
        assert_eq!(positive_integer_bytes(&[0, 0, 0x7f]), vec![0x7f]);
        assert_eq!(positive_integer_bytes(&[0, 0x80, 1]), vec![0, 0x80, 1]);
        assert_eq!(positive_integer_bytes(&[0xff, 0]), vec![0, 0xff, 0]);
    }
}
