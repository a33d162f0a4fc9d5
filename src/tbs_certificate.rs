use std::time::SystemTime;

use der::Encode;
use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use time::OffsetDateTime;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::Result;
use crate::key::PublicKey;

/// The signed part of a v3 certificate, before it is DER encoded.
///
/// `serial_number` holds the content octets of a positive INTEGER.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    pub issuer: Name,
    pub validity: Validity,
    pub subject: Name,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before)?,
            not_after: to_x509_time(self.validity.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: SerialNumber::new(&self.serial_number)?,
            signature: self.signature_algorithm.to_algorithm_identifier()?,
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(extensions),
        })
    }

    /// The bytes the issuer signs.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_tbs_certificate_inner()?.to_der()?)
    }
}

/// Encodes an instant the RFC 5280 way: `UTCTime` through 2049, `GeneralizedTime` after.
pub(crate) fn to_x509_time(instant: OffsetDateTime) -> Result<Time> {
    let system_time: SystemTime = instant.into();
    if instant.year() < 2050 {
        Ok(Time::UtcTime(UtcTime::from_system_time(system_time)?))
    } else {
        Ok(Time::GeneralTime(GeneralizedTime::from_system_time(
            system_time,
        )?))
    }
}

pub(crate) fn from_x509_time(time: &Time) -> OffsetDateTime {
    match time {
        Time::UtcTime(ut) => OffsetDateTime::from(ut.to_system_time()),
        Time::GeneralTime(gt) => OffsetDateTime::from(gt.to_system_time()),
    }
}
