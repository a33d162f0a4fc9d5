//! On-disk artifact store.
//!
//! Every artifact lives directly under the root directory and is named after
//! its basename and kind:
//!
//! | Kind | File | PEM label |
//! |---|---|---|
//! | [`ArtifactKind::PrivateKey`] | `{basename}.priv.pem` | `PRIVATE KEY` |
//! | [`ArtifactKind::CertificateRequest`] | `{basename}.csr.pem` | `CERTIFICATE REQUEST` |
//! | [`ArtifactKind::Certificate`] | `{basename}.cert.pem` | `CERTIFICATE` |
//! | [`ArtifactKind::Bundle`] | `{basename}.p12` | binary |
//!
//! Files are created exclusively and readable by the owner only. Nothing is
//! ever overwritten, so two invocations racing on the same basename leave one
//! of them with [`CertMgrError::AlreadyExists`].

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::cert::{CERTIFICATE_PEM_LABEL, Certificate};
use crate::csr::{CERTIFICATE_REQUEST_PEM_LABEL, CertificateRequest};
use crate::error::{CertMgrError, Result};
use crate::key::{KeyPair, PRIVATE_KEY_PEM_LABEL};
use crate::pem_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    PrivateKey,
    CertificateRequest,
    Certificate,
    Bundle,
}

impl ArtifactKind {
    /// File name suffix, without the leading dot.
    pub fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::PrivateKey => "priv.pem",
            ArtifactKind::CertificateRequest => "csr.pem",
            ArtifactKind::Certificate => "cert.pem",
            ArtifactKind::Bundle => "p12",
        }
    }

    /// PEM label, `None` for binary artifacts.
    pub fn label(self) -> Option<&'static str> {
        match self {
            ArtifactKind::PrivateKey => Some(PRIVATE_KEY_PEM_LABEL),
            ArtifactKind::CertificateRequest => Some(CERTIFICATE_REQUEST_PEM_LABEL),
            ArtifactKind::Certificate => Some(CERTIFICATE_PEM_LABEL),
            ArtifactKind::Bundle => None,
        }
    }

    pub fn file_name(self, basename: &str) -> String {
        format!("{basename}.{}", self.suffix())
    }
}

/// Typed access to the artifacts under one root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, kind: ArtifactKind, basename: &str) -> PathBuf {
        self.root.join(kind.file_name(basename))
    }

    pub fn exists(&self, kind: ArtifactKind, basename: &str) -> bool {
        self.path(kind, basename).exists()
    }

    /// Wraps `body` in a PEM block labelled for `kind` and writes it to a new file.
    #[instrument(skip(self, body))]
    pub fn write_envelope(
        &self,
        kind: ArtifactKind,
        basename: &str,
        body: &[u8],
    ) -> Result<PathBuf> {
        let label = kind.label().ok_or_else(|| {
            CertMgrError::EncodingFailure(format!("{kind:?} artifacts are not PEM encoded"))
        })?;
        let pem = pem_utils::der_to_pem(body, label);
        let path = self.path(kind, basename);
        write_new_file(&path, pem.as_bytes())?;
        info!(path = %path.display(), "wrote {label}");
        Ok(path)
    }

    /// Reads the single PEM block of the `kind` artifact named `basename`.
    #[instrument(skip(self))]
    pub fn read_envelope(&self, kind: ArtifactKind, basename: &str) -> Result<Vec<u8>> {
        let path = self.path(kind, basename);
        let label = kind.label().ok_or_else(|| CertMgrError::EnvelopeMismatch {
            path: path.clone(),
            reason: format!("{kind:?} artifacts are not PEM encoded"),
        })?;

        let bytes = fs::read(&path).map_err(|source| CertMgrError::StoreIo {
            path: path.clone(),
            source,
        })?;
        let text = std::str::from_utf8(&bytes).map_err(|e| CertMgrError::EnvelopeMismatch {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let der = pem_utils::pem_to_der(text, label)
            .map_err(|reason| CertMgrError::EnvelopeMismatch { path: path.clone(), reason })?;

        debug!(path = %path.display(), len = der.len(), "read {label}");
        Ok(der)
    }

    /// Writes `bytes` unwrapped to a new file.
    #[instrument(skip(self, bytes))]
    pub fn write_binary(
        &self,
        kind: ArtifactKind,
        basename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let path = self.path(kind, basename);
        write_new_file(&path, bytes)?;
        info!(path = %path.display(), len = bytes.len(), "wrote {kind:?}");
        Ok(path)
    }

    pub fn write_private_key(&self, basename: &str, key_pair: &KeyPair) -> Result<PathBuf> {
        self.write_envelope(ArtifactKind::PrivateKey, basename, &key_pair.to_pkcs8_der()?)
    }

    pub fn read_private_key(&self, basename: &str) -> Result<KeyPair> {
        KeyPair::from_pkcs8_der(&self.read_envelope(ArtifactKind::PrivateKey, basename)?)
    }

    pub fn write_request(&self, basename: &str, request: &CertificateRequest) -> Result<PathBuf> {
        self.write_envelope(
            ArtifactKind::CertificateRequest,
            basename,
            &request.to_der()?,
        )
    }

    pub fn read_request(&self, basename: &str) -> Result<CertificateRequest> {
        CertificateRequest::from_der(
            &self.read_envelope(ArtifactKind::CertificateRequest, basename)?,
        )
    }

    pub fn write_certificate(&self, basename: &str, certificate: &Certificate) -> Result<PathBuf> {
        self.write_envelope(ArtifactKind::Certificate, basename, &certificate.to_der()?)
    }

    pub fn read_certificate(&self, basename: &str) -> Result<Certificate> {
        Certificate::from_der(&self.read_envelope(ArtifactKind::Certificate, basename)?)
    }

    pub fn write_bundle(&self, basename: &str, bundle: &[u8]) -> Result<PathBuf> {
        self.write_binary(ArtifactKind::Bundle, basename, bundle)
    }
}

/// Creates `path` with owner-only permissions, failing if it already exists.
fn write_new_file(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|source| match source.kind() {
        io::ErrorKind::AlreadyExists => CertMgrError::AlreadyExists {
            path: path.to_path_buf(),
        },
        _ => CertMgrError::StoreIo {
            path: path.to_path_buf(),
            source,
        },
    })?;

    file.write_all(contents)
        .and_then(|()| file.sync_all())
        .map_err(|source| CertMgrError::StoreIo {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use crate::key::KeyAlgorithm;

    use super::*;

    fn scratch_store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_paths() {
        let store = ArtifactStore::new("/pki");
        assert_eq!(
            store.path(ArtifactKind::PrivateKey, "root"),
            PathBuf::from("/pki/root.priv.pem")
        );
        assert_eq!(
            store.path(ArtifactKind::CertificateRequest, "leaf"),
            PathBuf::from("/pki/leaf.csr.pem")
        );
        assert_eq!(
            store.path(ArtifactKind::Certificate, "leaf"),
            PathBuf::from("/pki/leaf.cert.pem")
        );
        assert_eq!(
            store.path(ArtifactKind::Bundle, "leaf"),
            PathBuf::from("/pki/leaf.p12")
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let (_dir, store) = scratch_store();
        let path = store
            .write_envelope(ArtifactKind::Certificate, "cert", &[0x30, 0x00])
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("-----BEGIN CERTIFICATE-----"));
        assert_eq!(
            store.read_envelope(ArtifactKind::Certificate, "cert").unwrap(),
            vec![0x30, 0x00]
        );
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let (_dir, store) = scratch_store();
        let path = store
            .write_envelope(ArtifactKind::Certificate, "dup", &[1, 2, 3])
            .unwrap();
        let before = fs::read(&path).unwrap();

        let err = store
            .write_envelope(ArtifactKind::Certificate, "dup", &[4, 5, 6])
            .unwrap_err();
        assert!(matches!(err, CertMgrError::AlreadyExists { path: p } if p == path));
        assert_eq!(fs::read(&path).unwrap(), before);

        store.write_bundle("dup", b"x").unwrap();
        assert!(matches!(
            store.write_bundle("dup", b"y"),
            Err(CertMgrError::AlreadyExists { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = scratch_store();
        let key_path = store
            .write_envelope(ArtifactKind::PrivateKey, "key", &[1])
            .unwrap();
        let bundle_path = store.write_bundle("key", &[1]).unwrap();
        for path in [key_path, bundle_path] {
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{}", path.display());
        }
    }

    #[test]
    fn test_read_rejects_wrong_label() {
        let (dir, store) = scratch_store();
        fs::write(
            dir.path().join("mixed.cert.pem"),
            pem_utils::der_to_pem(&[1], "CERTIFICATE REQUEST"),
        )
        .unwrap();
        let err = store
            .read_envelope(ArtifactKind::Certificate, "mixed")
            .unwrap_err();
        assert!(matches!(err, CertMgrError::EnvelopeMismatch { .. }));
    }

    #[test]
    fn test_read_rejects_trailing_data() {
        let (dir, store) = scratch_store();
        let mut text = pem_utils::der_to_pem(&[1], "CERTIFICATE");
        text.push_str(&pem_utils::der_to_pem(&[2], "CERTIFICATE"));
        fs::write(dir.path().join("two.cert.pem"), text).unwrap();
        let err = store
            .read_envelope(ArtifactKind::Certificate, "two")
            .unwrap_err();
        assert!(matches!(err, CertMgrError::EnvelopeMismatch { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let (_dir, store) = scratch_store();
        let err = store.read_certificate("absent").unwrap_err();
        assert!(
            matches!(&err, CertMgrError::StoreIo { source, .. } if source.kind() == io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn test_private_key_round_trip() {
        let (_dir, store) = scratch_store();
        let key_pair = KeyPair::generate(KeyAlgorithm::EcdsaP256).unwrap();
        store.write_private_key("ec", &key_pair).unwrap();
        let loaded = store.read_private_key("ec").unwrap();
        assert_eq!(loaded.public_key(), key_pair.public_key());
    }

    #[test]
    fn test_bundle_has_no_envelope() {
        let (_dir, store) = scratch_store();
        let err = store
            .write_envelope(ArtifactKind::Bundle, "b", &[1])
            .unwrap_err();
        assert!(matches!(err, CertMgrError::EncodingFailure(_)));
    }
}
