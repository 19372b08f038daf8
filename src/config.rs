//! Run configuration.
//!
//! A [`ResignConfig`] is assembled once, from an optional TOML file and
//! then the command-line options, and passed by reference into the
//! pipeline. Nothing here is global.
//!
//! Example file:
//!
//! ```toml
//! default_key_mappings = "vendor/acme/security"
//! jobs = 4
//!
//! [key_mappings]
//! "vendor/acme/testkeys/oem" = "vendor/acme/security/oem"
//!
//! [[extra_packages]]
//! packages = ["Camera.apk", "Gallery.apk"]
//! key = "vendor/acme/security/media"
//!
//! [signer]
//! signapk_jar = "out/host/linux-x86/framework/signapk.jar"
//! java_heap = "1g"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::certmap::ExtraPackages;
use crate::error::ConfigError;
use crate::keymap::KeyMappingTable;
use crate::rewriter::RewriteOptions;
use crate::signer::{DEFAULT_JAVA_HEAP, PACKAGE_ALIGNMENT};

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub default_key_mappings: Option<PathBuf>,
    #[serde(default)]
    pub key_mappings: BTreeMap<String, String>,
    #[serde(default)]
    pub extra_packages: Vec<ExtraPackagesEntry>,
    #[serde(default)]
    pub signer: SignerFileSection,
    #[serde(default)]
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExtraPackagesEntry {
    pub packages: Vec<String>,
    pub key: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignerFileSection {
    pub signapk_jar: Option<PathBuf>,
    pub java: Option<PathBuf>,
    pub java_heap: Option<String>,
    pub zipalign: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// How to invoke the external signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerSettings {
    pub signapk_jar: Option<PathBuf>,
    pub java: PathBuf,
    pub java_heap: String,
    pub zipalign: Option<PathBuf>,
}

impl Default for SignerSettings {
    fn default() -> Self {
        Self {
            signapk_jar: None,
            java: PathBuf::from("java"),
            java_heap: DEFAULT_JAVA_HEAP.to_string(),
            zipalign: None,
        }
    }
}

/// Everything one re-signing run needs besides the archives themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResignConfig {
    pub key_map: KeyMappingTable,
    pub extra_packages: Vec<ExtraPackages>,
    pub signer: SignerSettings,
    pub jobs: usize,
}

impl Default for ResignConfig {
    fn default() -> Self {
        Self {
            key_map: KeyMappingTable::new(),
            extra_packages: Vec::new(),
            signer: SignerSettings::default(),
            jobs: 1,
        }
    }
}

impl ResignConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a config file.
    pub fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.merge_file(file)?;
        Ok(config)
    }

    /// Layer a config file on top of the current values.
    pub fn merge_file(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(dir) = &file.default_key_mappings {
            self.key_map.apply_default_mappings(dir);
        }
        for (source, destination) in file.key_mappings {
            self.key_map.insert(source, destination);
        }
        for entry in file.extra_packages {
            if entry.packages.is_empty() || entry.key.trim().is_empty() {
                return Err(ConfigError::ExtraPackages(format!(
                    "{}={}",
                    entry.packages.join(","),
                    entry.key
                )));
            }
            self.extra_packages.push(ExtraPackages {
                packages: entry.packages,
                key: entry.key,
            });
        }

        let signer = file.signer;
        if signer.signapk_jar.is_some() {
            self.signer.signapk_jar = signer.signapk_jar;
        }
        if let Some(java) = signer.java {
            self.signer.java = java;
        }
        if let Some(heap) = signer.java_heap {
            self.signer.java_heap = heap;
        }
        if signer.zipalign.is_some() {
            self.signer.zipalign = signer.zipalign;
        }
        if let Some(jobs) = file.jobs {
            self.jobs = jobs.max(1);
        }
        Ok(())
    }

    /// Map the well-known test keys to `dir/{releasekey,media,shared,platform}`.
    pub fn with_default_key_mappings(&mut self, dir: &Path) -> &mut Self {
        self.key_map.apply_default_mappings(dir);
        self
    }

    /// Add a `SRC=DEST` key substitution.
    pub fn add_key_mapping(&mut self, pair: &str) -> Result<&mut Self, ConfigError> {
        self.key_map.insert_pair(pair)?;
        Ok(self)
    }

    /// Add an `A.apk,B.apk=KEY` override.
    pub fn add_extra_packages(&mut self, spec: &str) -> Result<&mut Self, ConfigError> {
        self.extra_packages.push(ExtraPackages::parse(spec)?);
        Ok(self)
    }

    pub fn rewrite_options(&self) -> RewriteOptions {
        RewriteOptions {
            jobs: self.jobs.max(1),
            alignment: PACKAGE_ALIGNMENT,
        }
    }
}
