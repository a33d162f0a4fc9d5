use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519;
use der::Tag;
use der::asn1::{Any, PrintableStringRef, SetOfVec};
use regex::Regex;
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
use crate::error::{CertMgrError, Result};

/// Subject or issuer name, limited to the attributes certmgr writes.
///
/// Empty optional fields are left out of the encoded name.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub state: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    #[builder(into)]
    pub organization_unit: Option<String>,
}

impl DistinguishedName {
    /// Encodes the name with one attribute per RDN.
    ///
    /// Attributes are emitted in the conventional C, ST, L, O, OU, CN order.
    /// The country is a `PrintableString`, everything else `UTF8String`.
    pub fn as_x509_name(&self) -> Result<Name> {
        let attributes = [
            (rfc4519::C, self.country.as_deref()),
            (rfc4519::ST, self.state.as_deref()),
            (rfc4519::L, self.locality.as_deref()),
            (rfc4519::O, self.organization.as_deref()),
            (rfc4519::OU, self.organization_unit.as_deref()),
            (rfc4519::CN, Some(self.common_name.as_str())),
        ];

        let mut rdns = Vec::new();
        for (oid, value) in attributes {
            let Some(value) = value.filter(|value| !value.is_empty()) else {
                continue;
            };
            let value = if oid == rfc4519::C {
                let printable = PrintableStringRef::new(value)?;
                Any::new(Tag::PrintableString, printable.as_bytes())?
            } else {
                Any::new(Tag::Utf8String, value.as_bytes())?
            };
            let attribute = AttributeTypeAndValue { oid, value };
            rdns.push(RelativeDistinguishedName(SetOfVec::try_from(vec![
                attribute,
            ])?));
        }
        Ok(RdnSequence(rdns))
    }

    /// Picks the known attributes out of `x509dn`, ignoring any others.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Ok(value) = std::str::from_utf8(attr.value.value()) else {
                    continue;
                };
                let value = value.to_string();
                match attr.oid {
                    rfc4519::CN => dn.common_name = value,
                    rfc4519::C => dn.country = Some(value),
                    rfc4519::ST => dn.state = Some(value),
                    rfc4519::L => dn.locality = Some(value),
                    rfc4519::O => dn.organization = Some(value),
                    rfc4519::OU => dn.organization_unit = Some(value),
                    _ => {}
                }
            }
        }

        dn
    }
}

/// `notBefore` / `notAfter` of a certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Tolerance for verifiers whose clocks run slightly behind.
    pub const CLOCK_SKEW: Duration = Duration::minutes(1);

    /// Creates a validity period for `spec`, measured from `now`.
    ///
    /// `notBefore` is backdated by [`Self::CLOCK_SKEW`].
    pub fn from_spec(now: OffsetDateTime, spec: ValiditySpec) -> Result<Self> {
        let not_after = now
            .checked_add(spec.duration()?)
            .ok_or_else(|| CertMgrError::InvalidValiditySpec(format!("{spec} is out of range")))?;
        Ok(Self {
            not_before: now - Self::CLOCK_SKEW,
            not_after,
        })
    }
}

/// Unit suffix of a validity string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidityUnit {
    /// `d`
    Days,
    /// `m`, 31 days
    Months,
    /// `y`, 12 months
    Years,
}

impl ValidityUnit {
    pub fn days(self) -> i64 {
        match self {
            ValidityUnit::Days => 1,
            ValidityUnit::Months => 31,
            ValidityUnit::Years => 12 * 31,
        }
    }

    fn suffix(self) -> char {
        match self {
            ValidityUnit::Days => 'd',
            ValidityUnit::Months => 'm',
            ValidityUnit::Years => 'y',
        }
    }
}

static VALIDITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+)([dmy])$").expect("invalid validity regex"));

/// A certificate lifetime such as `90d`, `6m` or `10y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValiditySpec {
    pub amount: i64,
    pub unit: ValidityUnit,
}

impl ValiditySpec {
    /// Total length in days.
    pub fn days(&self) -> Result<i64> {
        self.amount
            .checked_mul(self.unit.days())
            .ok_or_else(|| CertMgrError::InvalidValiditySpec(format!("{self} is out of range")))
    }

    pub fn duration(&self) -> Result<Duration> {
        let days = self.days()?;
        if days > Duration::MAX.whole_days() {
            return Err(CertMgrError::InvalidValiditySpec(format!(
                "{self} is out of range"
            )));
        }
        Ok(Duration::days(days))
    }
}

impl Default for ValiditySpec {
    fn default() -> Self {
        Self {
            amount: 1,
            unit: ValidityUnit::Years,
        }
    }
}

impl FromStr for ValiditySpec {
    type Err = CertMgrError;

    fn from_str(s: &str) -> Result<Self> {
        let captures = VALIDITY_PATTERN.captures(s).ok_or_else(|| {
            CertMgrError::InvalidValiditySpec(format!(
                "{s:?} (expected a number with suffix d, m or y)"
            ))
        })?;

        let amount = captures[1].parse::<i64>().map_err(|e| {
            CertMgrError::InvalidValiditySpec(format!("invalid number for validity {s:?}: {e}"))
        })?;
        let unit = match &captures[2] {
            "d" => ValidityUnit::Days,
            "m" => ValidityUnit::Months,
            _ => ValidityUnit::Years,
        };

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for ValiditySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

/// An extension ready to be placed in a TBS certificate.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// `extnValue` contents
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Encodes a typed extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes the value as `E`. The OID is not checked.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_spec_days() {
        let cases = [
            ("1d", 1),
            ("30d", 30),
            ("1m", 31),
            ("6m", 186),
            ("1y", 372),
            ("10y", 3720),
            ("0d", 0),
        ];
        for (input, days) in cases {
            let spec: ValiditySpec = input.parse().unwrap();
            assert_eq!(spec.days().unwrap(), days, "{input}");
            assert_eq!(spec.duration().unwrap(), Duration::days(days), "{input}");
            assert_eq!(spec.to_string(), input);
        }
    }

    #[test]
    fn test_validity_spec_rejects_bad_input() {
        for input in [
            "", "d", "1", "10", "1w", "1h", "y1", "-1d", "+1d", "1.5y", " 1d", "1d ", "1dd",
            "99999999999999999999d",
        ] {
            let err = input.parse::<ValiditySpec>().unwrap_err();
            assert!(
                matches!(err, CertMgrError::InvalidValiditySpec(_)),
                "{input:?}: {err}"
            );
        }
    }

    #[test]
    fn test_validity_from_spec() {
        let now = OffsetDateTime::now_utc();
        let validity = Validity::from_spec(now, "2m".parse().unwrap()).unwrap();
        assert_eq!(validity.not_before, now - Duration::minutes(1));
        assert_eq!(validity.not_after, now + Duration::days(62));
    }

    #[test]
    fn test_validity_out_of_range() {
        let now = OffsetDateTime::now_utc();
        let err = Validity::from_spec(now, "100000y".parse().unwrap()).unwrap_err();
        assert!(matches!(err, CertMgrError::InvalidValiditySpec(_)));
    }

    #[test]
    fn test_distinguished_name_round_trip() {
        let dn = DistinguishedName::builder()
            .common_name("Root CA")
            .country("NL")
            .state("Noord-Holland")
            .locality("Amsterdam")
            .organization("Example Corp")
            .organization_unit("Ops")
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 6);
        assert_eq!(DistinguishedName::from_x509_name(&name), dn);
    }

    #[test]
    fn test_distinguished_name_skips_empty_fields() {
        let dn = DistinguishedName::builder()
            .common_name("leaf.example.com")
            .organization("")
            .build();
        let name = dn.as_x509_name().unwrap();
        assert_eq!(name.0.len(), 1);
        assert_eq!(name.to_string(), "CN=leaf.example.com");
    }
}
