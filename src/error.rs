//! Error taxonomy for the re-signing pipeline.
//!
//! Every variant here is fatal to a run. Non-fatal conditions (a build
//! property without the `test-keys` marker) are reported as
//! [`FingerprintWarning`](crate::fingerprint::FingerprintWarning) instead.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A line of `META/apkcerts.txt` that cannot be trusted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("apkcerts line {line_number} is malformed: {line}")]
    MalformedLine { line_number: usize, line: String },

    #[error(
        "apkcerts line {line_number}: certificate {certificate}.x509.pem and private key \
         {private_key}.pk8 for {package} do not share a stem"
    )]
    MismatchedKeyPair {
        line_number: usize,
        package: String,
        certificate: String,
        private_key: String,
    },
}

/// Failure to obtain the secret for a key.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("no password available for key {key}")]
    Missing { key: String },

    #[error("could not read password for key {key}")]
    Unavailable {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read password file {path}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("password file {path} line {line_number} is malformed")]
    MalformedFile { path: PathBuf, line_number: usize },
}

/// Failure of the external signer for one package.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to prepare signing workspace")]
    Workspace(#[source] io::Error),

    #[error("failed to launch {tool}")]
    Launch {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("signer rejected key {key}: {reason}")]
    Rejected { key: String, reason: String },
}

/// Failure reading from or writing to an archive container.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to open archive")]
    Open(#[source] zip::result::ZipError),

    #[error("failed to read archive entry #{index}")]
    Read {
        index: usize,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to read archive entry {path}")]
    ReadPath {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to write archive entry {path}")]
    Write {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to finalize archive")]
    Finish(#[source] zip::result::ZipError),

    #[error("entry index {index} out of range (archive has {len} entries)")]
    OutOfRange { index: usize, len: usize },

    #[error("I/O error on archive entry {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Invalid configuration supplied on the command line or in a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid key mapping '{0}': expected SRC=DEST")]
    KeyMapping(String),

    #[error("invalid extra package spec '{0}': expected NAME[,NAME...]=KEY")]
    ExtraPackages(String),

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Umbrella error for one re-signing run.
#[derive(Debug, Error)]
pub enum ResignError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("failed to sign {path} with key {key}")]
    Sign {
        path: String,
        key: String,
        #[source]
        source: SignerError,
    },

    #[error("target-files archive has no {0} entry")]
    MissingMetadata(String),
}
