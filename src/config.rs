//! JSON configuration.
//!
//! ```json
//! {
//!   "rootdir": "/var/lib/certmgr",
//!   "identity": {
//!     "country": "NL",
//!     "organization": "Example Corp",
//!     "organizational_unit": "Ops",
//!     "locality": "Amsterdam",
//!     "province": "Noord-Holland"
//!   }
//! }
//! ```
//!
//! Every field is optional. `CERTMGR_ROOT_DIR` overrides `rootdir`, and an
//! empty root directory means the current working directory.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cert::params::DistinguishedName;
use crate::error::{CertMgrError, Result};
use crate::store::ArtifactStore;

/// Environment variable overriding the configured root directory.
pub const ROOT_DIR_ENV: &str = "CERTMGR_ROOT_DIR";

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./certmgr.json";

/// Subject fields shared by every certificate this tool issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityDefaults {
    pub country: String,
    pub organization: String,
    pub organizational_unit: String,
    pub locality: String,
    pub province: String,
}

impl IdentityDefaults {
    /// The full subject for a certificate with the given common name.
    pub fn subject(&self, common_name: &str) -> DistinguishedName {
        let field = |value: &String| Some(value.clone()).filter(|value| !value.is_empty());
        DistinguishedName {
            common_name: common_name.to_string(),
            country: field(&self.country),
            state: field(&self.province),
            locality: field(&self.locality),
            organization: field(&self.organization),
            organization_unit: field(&self.organizational_unit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rootdir: PathBuf,
    pub identity: IdentityDefaults,
}

impl Config {
    /// Reads `path` and applies the `CERTMGR_ROOT_DIR` override.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| CertMgrError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            serde_json::from_str(&contents).map_err(|source| CertMgrError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        config.resolve_root_dir(env::var(ROOT_DIR_ENV).ok())?;
        debug!(config = ?config, "loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Applies a root directory override, then falls back to the current directory.
    pub fn resolve_root_dir(&mut self, env_override: Option<String>) -> Result<()> {
        if let Some(dir) = env_override.filter(|dir| !dir.is_empty()) {
            self.rootdir = PathBuf::from(dir);
        }
        if self.rootdir.as_os_str().is_empty() {
            self.rootdir = env::current_dir().map_err(|source| CertMgrError::StoreIo {
                path: PathBuf::from("."),
                source,
            })?;
        }
        Ok(())
    }

    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.rootdir)
    }
}
