use p12_keystore::{KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha1::{Digest, Sha1};
use tracing::{debug, instrument};

use crate::cert::Certificate;
use crate::error::{CertMgrError, Result};
use crate::key::KeyPair;

/// Password protecting every exported bundle.
///
/// Publicly known on purpose: the bundle file itself is the protected artifact,
/// and a fixed password keeps imports into other tools reproducible.
pub const DEFAULT_PASSWORD: &str = "changeit";

/// Alias used when the certificate has no common name.
const FALLBACK_ALIAS: &str = "certmgr";

/// Packs `key_pair` and `certificate` into a PKCS#12 bundle encrypted with
/// [`DEFAULT_PASSWORD`] (PBES2 with AES-256-CBC, SHA-256 MAC).
#[instrument(skip_all, fields(subject = %certificate.subject_name()))]
pub fn export_bundle(key_pair: &KeyPair, certificate: &Certificate) -> Result<Vec<u8>> {
    let certificate_key = certificate.public_key()?;
    if certificate_key != key_pair.public_key() {
        return Err(CertMgrError::EncodingFailure(
            "private key does not match the certificate".to_string(),
        ));
    }

    let cert_der = certificate.to_der()?;
    let key_der = key_pair.to_pkcs8_der()?;
    let local_key_id = Sha1::digest(&cert_der);

    let cert = p12_keystore::Certificate::from_der(&cert_der).map_err(encoding_failure)?;

    let common_name = certificate.subject().common_name;
    let alias = if common_name.is_empty() {
        FALLBACK_ALIAS.to_string()
    } else {
        common_name
    };

    let mut keystore = KeyStore::new();
    let key_chain = PrivateKeyChain::new(&key_der, local_key_id.as_slice(), vec![cert]);
    keystore.add_entry(&alias, KeyStoreEntry::PrivateKeyChain(key_chain));

    let bundle = keystore
        .writer(DEFAULT_PASSWORD)
        .write()
        .map_err(encoding_failure)?;
    debug!(alias, len = bundle.len(), "encoded PKCS#12 bundle");
    Ok(bundle)
}

fn encoding_failure(err: impl std::fmt::Display) -> CertMgrError {
    CertMgrError::EncodingFailure(err.to_string())
}
