#![allow(dead_code)]

use certmgr::cert::Certificate;
use certmgr::cert::params::ValiditySpec;
use certmgr::cert::template::{CertificateRole, SignArgs};
use certmgr::config::IdentityDefaults;
use certmgr::key::KeyAlgorithm;
use certmgr::manager::CertManager;
use certmgr::store::ArtifactStore;
use tempfile::TempDir;

pub fn identity() -> IdentityDefaults {
    IdentityDefaults {
        country: "NL".to_string(),
        organization: "Example Corp".to_string(),
        organizational_unit: "Platform".to_string(),
        locality: "Amsterdam".to_string(),
        province: "Noord-Holland".to_string(),
    }
}

/// A manager over a fresh temporary directory. Keep the `TempDir` alive.
pub fn scratch_manager() -> (TempDir, CertManager) {
    let dir = tempfile::tempdir().unwrap();
    let manager = CertManager::new(ArtifactStore::new(dir.path()), identity());
    (dir, manager)
}

pub fn validity(value: &str) -> ValiditySpec {
    value.parse().unwrap()
}

/// Issues a self-signed P-256 CA stored under `basename`.
pub fn create_ec_root(manager: &CertManager, basename: &str) -> Certificate {
    let args = SignArgs::builder()
        .common_name(format!("{basename} CA"))
        .self_signed(true)
        .validity(validity("1y"))
        .build();
    manager
        .create_key_and_cert(CertificateRole::Ca, basename, KeyAlgorithm::EcdsaP256, &args)
        .unwrap()
}

pub fn chained_args(common_name: &str, signer: &str) -> SignArgs {
    SignArgs::builder()
        .common_name(common_name)
        .signer(signer)
        .validity(validity("30d"))
        .build()
}
