use std::io;

use tracing::{info, instrument, warn};

use crate::bundle::{self, DEFAULT_PASSWORD};
use crate::cert::template::{CertificateRole, CertificateTemplate, SignArgs, SigningMode};
use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::config::{Config, IdentityDefaults};
use crate::csr::CertificateRequest;
use crate::error::{CertMgrError, Result};
use crate::issuer::Issuer;
use crate::key::{KeyAlgorithm, KeyPair};
use crate::store::ArtifactStore;

/// Runs the certmgr commands against one artifact store.
///
/// Each method is a single transaction; nothing is kept between calls.
#[derive(Debug, Clone)]
pub struct CertManager {
    store: ArtifactStore,
    identity: IdentityDefaults,
}

impl CertManager {
    pub fn new(store: ArtifactStore, identity: IdentityDefaults) -> Self {
        Self { store, identity }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store(), config.identity.clone())
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Generates a key and a CSR whose common name is `basename`.
    #[instrument(skip(self))]
    pub fn create_key_and_csr(&self, basename: &str, algorithm: KeyAlgorithm) -> Result<()> {
        let key_pair = KeyPair::generate(algorithm)?;
        let request = CertificateRequest::build(&key_pair, basename)?;

        self.store.write_private_key(basename, &key_pair)?;
        self.store.write_request(basename, &request)?;
        Ok(())
    }

    /// Generates a key and issues a certificate for it.
    ///
    /// The key is written once the template and signer are resolved and before
    /// signing, so a signing failure leaves a usable key behind.
    #[instrument(skip(self, args), fields(common_name = %args.common_name))]
    pub fn create_key_and_cert(
        &self,
        role: CertificateRole,
        basename: &str,
        algorithm: KeyAlgorithm,
        args: &SignArgs,
    ) -> Result<Certificate> {
        let key_pair = KeyPair::generate(algorithm)?;
        let template = CertificateTemplate::build(role, args, &self.identity)?;
        let signer = match &template.signing_mode {
            SigningMode::SelfSigned => None,
            SigningMode::Chained { signer } => Some(self.load_signer(signer)?),
        };

        self.store.write_private_key(basename, &key_pair)?;

        let certificate = match &signer {
            None => Certificate::new_self_signed(&template, &key_pair),
            Some(signer) => signer.issue(&template, &key_pair.public_key()),
        }
        .inspect_err(|err| warn!(%err, "signing failed, the new key stays on disk"))?;

        self.store.write_certificate(basename, &certificate)?;
        Ok(certificate)
    }

    /// Issues a certificate for the stored CSR `basename`.
    ///
    /// A CSR cannot be self-signed. When `args` carries no common name the one
    /// in the CSR is used.
    #[instrument(skip(self, args), fields(common_name = %args.common_name))]
    pub fn sign_csr(
        &self,
        role: CertificateRole,
        basename: &str,
        args: &SignArgs,
    ) -> Result<Certificate> {
        if args.self_signed {
            return Err(CertMgrError::InvalidSelfSignRequest(
                "a CSR can't be self-signed".to_string(),
            ));
        }

        let request = self.store.read_request(basename)?;
        let public_key = request.validate()?;

        let mut args = args.clone();
        if args.common_name.is_empty() {
            args.common_name = request.subject().common_name;
        }
        let template = CertificateTemplate::build(role, &args, &self.identity)?;

        let signer = match &template.signing_mode {
            SigningMode::Chained { signer } => self.load_signer(signer)?,
            SigningMode::SelfSigned => {
                return Err(CertMgrError::InvalidSelfSignRequest(
                    "a CSR can't be self-signed".to_string(),
                ));
            }
        };

        let certificate = signer.issue(&template, &public_key)?;
        self.store.write_certificate(basename, &certificate)?;
        Ok(certificate)
    }

    /// Exports the stored key and certificate `basename` as a PKCS#12 bundle.
    ///
    /// Returns the password protecting the bundle.
    #[instrument(skip(self))]
    pub fn to_pkcs12(&self, basename: &str) -> Result<&'static str> {
        let key_pair = self.store.read_private_key(basename)?;
        let certificate = self.store.read_certificate(basename)?;

        let bundle = bundle::export_bundle(&key_pair, &certificate)?;
        let path = self.store.write_bundle(basename, &bundle)?;
        info!(path = %path.display(), "exported bundle");
        Ok(DEFAULT_PASSWORD)
    }

    /// Loads the key and certificate stored under `basename` for signing.
    ///
    /// The key must be the one certified by the certificate.
    fn load_signer(&self, basename: &str) -> Result<CertificateWithPrivateKey> {
        let key = self
            .store
            .read_private_key(basename)
            .map_err(|err| signer_error(basename, err))?;
        let cert = self
            .store
            .read_certificate(basename)
            .map_err(|err| signer_error(basename, err))?;

        let certified_key = cert
            .public_key()
            .map_err(|err| signer_error(basename, err))?;
        if certified_key != key.public_key() {
            return Err(signer_error(
                basename,
                CertMgrError::SigningFailure(
                    "private key does not match the signer certificate".to_string(),
                ),
            ));
        }
        Ok(CertificateWithPrivateKey { cert, key })
    }
}

fn signer_error(basename: &str, err: CertMgrError) -> CertMgrError {
    match err {
        CertMgrError::StoreIo { path, source } if source.kind() == io::ErrorKind::NotFound => {
            CertMgrError::SignerNotFound {
                basename: basename.to_string(),
                path,
            }
        }
        other => CertMgrError::SignerUnreadable {
            basename: basename.to_string(),
            source: Box::new(other),
        },
    }
}
