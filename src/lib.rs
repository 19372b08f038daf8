//! Re-sign the application packages of an Android target-files archive
//! with release keys and mark the build as release-signed.

pub mod archive;
pub mod certmap;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod keymap;
pub mod logging;
pub mod passwords;
pub mod rewriter;
pub mod signer;

pub use archive::{ArchiveEntry, EntryMetadata, EntrySink, EntrySource, MemoryArchive};
pub use certmap::{resolve_certificate_map, CertificateEntry, CertificateMap, ExtraPackages};
pub use config::ResignConfig;
pub use error::{ArchiveError, ConfigError, ParseError, PasswordError, ResignError, SignerError};
pub use fingerprint::{patch_build_props, FingerprintWarning, PatchOutcome};
pub use keymap::KeyMappingTable;
pub use passwords::{collect_passwords, PasswordMap, PasswordProvider};
pub use rewriter::{resign_target_files, rewrite_archive, ResignReport, RewriteOptions};
pub use signer::{SignApkSigner, Signer};
