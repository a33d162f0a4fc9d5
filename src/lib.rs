//! # certmgr - A Local Certificate Authority Workbench
//!
//! certmgr generates key pairs and certificate signing requests, issues
//! self-signed root, intermediate and leaf X.509 certificates, and exports
//! key + certificate pairs as PKCS#12 bundles. It is built entirely on the
//! RustCrypto crates.
//!
//! All artifacts are PEM files under one root directory, addressed by a
//! basename (see [`store`]). Files are never overwritten.
//!
//! ## Supported Key Types
//!
//! - **RSA**: 2048 and 4096-bit keys, signing with SHA-256
//! - **ECDSA**: P-256 (SHA-256) and P-384 (SHA-384)
//!
//! ## Certificate Roles
//!
//! - `ca`: CA certificate, key usage keyCertSign + cRLSign, unconstrained path length
//! - `server`: keyEncipherment + digitalSignature, extended key usage serverAuth
//! - `client`: keyEncipherment + digitalSignature, extended key usage clientAuth
//!
//! Only `ca` certificates can be self-signed. Everything else names a signer,
//! the basename of a stored key and certificate. Which certificate signed which
//! is not recorded anywhere else, so keeping basenames meaningful is up to the
//! operator.
//!
//! ## Quick Start
//!
//! ### Issuing a Root and a Server Certificate
//!
//! ```rust,no_run
//! use certmgr::{
//!     cert::template::{CertificateRole, SignArgs},
//!     config::IdentityDefaults,
//!     key::KeyAlgorithm,
//!     manager::CertManager,
//!     store::ArtifactStore,
//! };
//!
//! # fn main() -> Result<(), certmgr::error::CertMgrError> {
//! let manager = CertManager::new(ArtifactStore::new("./pki"), IdentityDefaults::default());
//!
//! // Self-signed root, valid for ten years
//! let root_args = SignArgs::builder()
//!     .common_name("Root CA")
//!     .self_signed(true)
//!     .validity("10y".parse()?)
//!     .build();
//! manager.create_key_and_cert(CertificateRole::Ca, "root", KeyAlgorithm::Rsa2048, &root_args)?;
//!
//! // Key + CSR for a server, then sign the CSR with the root
//! manager.create_key_and_csr("leaf", KeyAlgorithm::EcdsaP256)?;
//! let leaf_args = SignArgs::builder()
//!     .common_name("leaf.example.com")
//!     .dns_names("leaf.example.com,www.example.com")
//!     .signer("root")
//!     .build();
//! manager.sign_csr(CertificateRole::Server, "leaf", &leaf_args)?;
//!
//! // leaf.p12, protected with the default password
//! let password = manager.to_pkcs12("leaf")?;
//! println!("bundle password: {password}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Signing Without a Store
//!
//! ```rust,no_run
//! use certmgr::{
//!     cert::{Certificate, CertificateWithPrivateKey, template::{CertificateRole, CertificateTemplate, SignArgs}},
//!     config::IdentityDefaults,
//!     issuer::Issuer,
//!     key::{KeyAlgorithm, KeyPair},
//! };
//!
//! # fn main() -> Result<(), certmgr::error::CertMgrError> {
//! let identity = IdentityDefaults::default();
//!
//! let ca_key = KeyPair::generate(KeyAlgorithm::EcdsaP384)?;
//! let ca_args = SignArgs::builder().common_name("Example CA").self_signed(true).build();
//! let ca_template = CertificateTemplate::build(CertificateRole::Ca, &ca_args, &identity)?;
//! let ca = CertificateWithPrivateKey {
//!     cert: Certificate::new_self_signed(&ca_template, &ca_key)?,
//!     key: ca_key,
//! };
//!
//! let client_key = KeyPair::generate(KeyAlgorithm::EcdsaP256)?;
//! let client_args = SignArgs::builder().common_name("alice").signer("Example CA").build();
//! let client_template = CertificateTemplate::build(CertificateRole::Client, &client_args, &identity)?;
//! let client_cert = ca.issue(&client_template, &client_key.public_key())?;
//!
//! println!("{}", client_cert.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`error::CertMgrError`]. Nothing is retried;
//! a failure aborts the command. When issuing a certificate for a new key the
//! key is written before signing, so a signing failure can leave a key without
//! a certificate.

pub mod bundle;
pub mod cert;
pub mod config;
pub mod csr;
pub mod error;
pub mod issuer;
pub mod key;
pub mod manager;
pub mod pem_utils;
pub mod store;
pub mod tbs_certificate;
