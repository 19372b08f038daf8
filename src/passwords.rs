//! One password per distinct signing key, collected once per run.
//!
//! Password acquisition goes through the [`PasswordProvider`] trait so the
//! pipeline never performs terminal I/O on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::certmap::CertificateMap;
use crate::error::PasswordError;

/// Environment variable naming a password file, as used by platform tools.
pub const PASSWORD_FILE_ENV: &str = "ANDROID_PW_FILE";

static PASSWORD_FILE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[\[\[\s*(.*?)\s*\]\]\]\s*(\S+)$").expect("password file pattern is valid")
});

/// Source of key secrets.
pub trait PasswordProvider {
    fn password(&mut self, key: &str) -> Result<String, PasswordError>;
}

/// Key identity -> secret. Built once by [`collect_passwords`] and only read
/// afterwards.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PasswordMap {
    secrets: BTreeMap<String, String>,
}

impl PasswordMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

impl fmt::Debug for PasswordMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.secrets.keys().map(|key| (key, "<redacted>")))
            .finish()
    }
}

impl FromIterator<(String, String)> for PasswordMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            secrets: iter.into_iter().collect(),
        }
    }
}

/// Ask `provider` for the secret of every distinct key in `certmap`,
/// exactly once per key.
pub fn collect_passwords(
    certmap: &CertificateMap,
    provider: &mut dyn PasswordProvider,
) -> Result<PasswordMap, PasswordError> {
    let mut secrets = BTreeMap::new();
    for key in certmap.distinct_keys() {
        debug!(key, "requesting key password");
        let secret = provider.password(key)?;
        secrets.insert(key.to_string(), secret);
    }
    Ok(PasswordMap { secrets })
}

/// Fixed secrets, typically for keys without a passphrase or for tests.
#[derive(Clone, Default)]
pub struct StaticPasswords {
    secrets: BTreeMap<String, String>,
}

impl StaticPasswords {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), secret.into());
        self
    }
}

impl PasswordProvider for StaticPasswords {
    fn password(&mut self, key: &str) -> Result<String, PasswordError> {
        self.secrets
            .get(key)
            .cloned()
            .ok_or_else(|| PasswordError::Missing {
                key: key.to_string(),
            })
    }
}

/// Secrets read from a password file.
///
/// Format, one key per line:
///
/// ```text
/// [[[ secret ]]] vendor/acme/keys/releasekey
/// ```
///
/// Keys absent from the file are delegated to the fallback provider when
/// one is set, otherwise they are an error.
pub struct PasswordFile {
    path: PathBuf,
    secrets: BTreeMap<String, String>,
    fallback: Option<Box<dyn PasswordProvider>>,
}

impl fmt::Debug for PasswordFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordFile")
            .field("path", &self.path)
            .field("keys", &self.secrets.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl PasswordFile {
    pub fn load(path: &Path) -> Result<Self, PasswordError> {
        let content = fs::read_to_string(path).map_err(|source| PasswordError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self, PasswordError> {
        let mut secrets = BTreeMap::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let captures =
                PASSWORD_FILE_LINE
                    .captures(line)
                    .ok_or_else(|| PasswordError::MalformedFile {
                        path: path.to_path_buf(),
                        line_number: index + 1,
                    })?;
            secrets.insert(captures[2].to_string(), captures[1].to_string());
        }
        Ok(Self {
            path: path.to_path_buf(),
            secrets,
            fallback: None,
        })
    }

    pub fn with_fallback(mut self, fallback: Box<dyn PasswordProvider>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl PasswordProvider for PasswordFile {
    fn password(&mut self, key: &str) -> Result<String, PasswordError> {
        if let Some(secret) = self.secrets.get(key) {
            return Ok(secret.clone());
        }
        match self.fallback.as_mut() {
            Some(fallback) => {
                debug!(key, file = %self.path.display(), "key not in password file");
                fallback.password(key)
            }
            None => Err(PasswordError::Missing {
                key: key.to_string(),
            }),
        }
    }
}

/// Prompts for each key on `output` and reads one line from `input`.
pub struct PromptPasswords<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptPasswords<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptPasswords<io::StdinLock<'static>, io::Stderr> {
    /// Prompt on stderr, read from stdin.
    pub fn terminal() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PasswordProvider for PromptPasswords<R, W> {
    fn password(&mut self, key: &str) -> Result<String, PasswordError> {
        let unavailable = |source| PasswordError::Unavailable {
            key: key.to_string(),
            source,
        };

        write!(self.output, "Enter password for {key} key> ").map_err(unavailable)?;
        self.output.flush().map_err(unavailable)?;

        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(unavailable)?;
        if read == 0 {
            return Err(unavailable(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input closed before a password was entered",
            )));
        }

        let secret = line.strip_suffix('\n').unwrap_or(&line);
        let secret = secret.strip_suffix('\r').unwrap_or(secret);
        Ok(secret.to_string())
    }
}
