//! Resolution of package -> signing key from `META/apkcerts.txt`.
//!
//! Each line of the metadata names a package, its certificate and its
//! private key:
//!
//! ```text
//! name="Foo.apk" certificate="build/target/product/security/testkey.x509.pem" private_key="build/target/product/security/testkey.pk8"
//! ```
//!
//! The certificate and private key must share a stem; that stem is the key
//! identity handed to the key mapping table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ConfigError, ParseError};
use crate::keymap::KeyMappingTable;

/// Path of the certificate metadata inside a target-files archive.
pub const APKCERTS_PATH: &str = "META/apkcerts.txt";

static APKCERTS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^name="(.*)"\s+certificate="(.*)\.x509\.pem"\s+private_key="(.*)\.pk8"$"#)
        .expect("apkcerts pattern is valid")
});

/// One parsed line of `META/apkcerts.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub package_name: String,
    pub certificate_base_name: String,
}

/// Packages whose key is forced regardless of what the metadata says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraPackages {
    pub packages: Vec<String>,
    pub key: String,
}

impl ExtraPackages {
    /// Parse `A.apk,B.apk=key`.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let (names, key) = spec
            .split_once('=')
            .ok_or_else(|| ConfigError::ExtraPackages(spec.to_string()))?;
        let key = key.trim();
        let packages: Vec<String> = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if key.is_empty() || packages.is_empty() {
            return Err(ConfigError::ExtraPackages(spec.to_string()));
        }
        Ok(Self {
            packages,
            key: key.to_string(),
        })
    }
}

/// Package file base name -> resolved key identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateMap {
    entries: BTreeMap<String, String>,
}

impl CertificateMap {
    pub fn get(&self, package: &str) -> Option<&str> {
        self.entries.get(package).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Distinct key identities, sorted.
    pub fn distinct_keys(&self) -> BTreeSet<&str> {
        self.entries.values().map(String::as_str).collect()
    }
}

impl FromIterator<(String, String)> for CertificateMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Parse every non-blank line of the metadata.
pub fn parse_apkcerts(text: &str) -> Result<Vec<CertificateEntry>, ParseError> {
    let mut entries = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        entries.push(parse_line(index + 1, line)?);
    }
    Ok(entries)
}

fn parse_line(line_number: usize, line: &str) -> Result<CertificateEntry, ParseError> {
    let captures = APKCERTS_LINE
        .captures(line)
        .ok_or_else(|| ParseError::MalformedLine {
            line_number,
            line: line.to_string(),
        })?;

    let package = &captures[1];
    let certificate = &captures[2];
    let private_key = &captures[3];

    if certificate != private_key {
        return Err(ParseError::MismatchedKeyPair {
            line_number,
            package: package.to_string(),
            certificate: certificate.to_string(),
            private_key: private_key.to_string(),
        });
    }

    Ok(CertificateEntry {
        package_name: package.to_string(),
        certificate_base_name: certificate.to_string(),
    })
}

/// Build the package -> key map from metadata text, the key mapping table
/// and extra overrides. Overrides are applied last and resolve their key
/// through the same table.
pub fn resolve_certificate_map(
    metadata: &str,
    key_map: &KeyMappingTable,
    extra: &[ExtraPackages],
) -> Result<CertificateMap, ParseError> {
    let mut entries = BTreeMap::new();

    for entry in parse_apkcerts(metadata)? {
        let key = key_map.resolve(&entry.certificate_base_name).to_string();
        entries.insert(entry.package_name, key);
    }

    for override_ in extra {
        let key = key_map.resolve(&override_.key);
        for package in &override_.packages {
            entries.insert(package.clone(), key.to_string());
        }
    }

    Ok(CertificateMap { entries })
}
