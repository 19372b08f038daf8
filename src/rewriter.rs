//! The re-signing pipeline.
//!
//! Entries are read from the source in order, classified, transformed and
//! written to the sink in the same order. Package signing for a window of
//! up to `jobs` entries runs on scoped threads; writes stay sequential.

use std::thread;

use tracing::{debug, info};

use crate::archive::{base_name, ArchiveEntry, EntrySink, EntrySource};
use crate::certmap::{resolve_certificate_map, CertificateMap, APKCERTS_PATH};
use crate::config::ResignConfig;
use crate::error::{PasswordError, ResignError};
use crate::fingerprint::{patch_build_props, FingerprintWarning, BUILD_PROP_PATH};
use crate::passwords::{collect_passwords, PasswordMap, PasswordProvider};
use crate::signer::{Signer, PACKAGE_ALIGNMENT};

/// File extension of application packages.
pub const PACKAGE_EXTENSION: &str = ".apk";

/// Tuning for [`rewrite_archive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Maximum number of packages signed concurrently.
    pub jobs: usize,
    /// Alignment requested from the signer.
    pub alignment: u32,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            alignment: PACKAGE_ALIGNMENT,
        }
    }
}

/// What happened to each entry of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResignReport {
    pub signed: Vec<SignedPackage>,
    /// Packages with no key in the certificate map, copied unchanged.
    pub skipped: Vec<String>,
    pub patched: Vec<String>,
    pub copied: usize,
    pub warnings: Vec<FingerprintWarning>,
}

impl ResignReport {
    pub fn total_entries(&self) -> usize {
        self.signed.len() + self.skipped.len() + self.patched.len() + self.copied
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPackage {
    pub path: String,
    pub key: String,
}

/// How a single entry is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Sign { key: String },
    Skip,
    PatchBuildProps,
    Copy,
}

/// Decide what to do with the entry at `path`.
pub fn classify(path: &str, certmap: &CertificateMap) -> Disposition {
    if path.ends_with(PACKAGE_EXTENSION) {
        return match certmap.get(base_name(path)) {
            Some(key) => Disposition::Sign {
                key: key.to_string(),
            },
            None => Disposition::Skip,
        };
    }
    if path == BUILD_PROP_PATH {
        return Disposition::PatchBuildProps;
    }
    Disposition::Copy
}

/// Shared, read-only state handed to every signing task.
#[derive(Clone, Copy)]
struct SigningContext<'a> {
    certmap: &'a CertificateMap,
    passwords: &'a PasswordMap,
    signer: &'a dyn Signer,
    alignment: u32,
}

enum Outcome {
    Signed { key: String },
    Skipped,
    Patched { warnings: Vec<FingerprintWarning> },
    Copied,
}

struct Processed {
    entry: ArchiveEntry,
    outcome: Outcome,
}

fn process_entry(entry: ArchiveEntry, ctx: SigningContext<'_>) -> Result<Processed, ResignError> {
    match classify(&entry.path, ctx.certmap) {
        Disposition::Sign { key } => {
            let password = ctx
                .passwords
                .get(&key)
                .ok_or_else(|| PasswordError::Missing { key: key.clone() })?;
            info!(path = %entry.path, key = %key, "signing");
            let signed = ctx
                .signer
                .sign(&entry.data, &key, password, ctx.alignment)
                .map_err(|source| ResignError::Sign {
                    path: entry.path.clone(),
                    key: key.clone(),
                    source,
                })?;
            Ok(Processed {
                entry: entry.with_data(signed),
                outcome: Outcome::Signed { key },
            })
        }
        Disposition::Skip => {
            info!(path = %entry.path, "skipping: no key for package");
            Ok(Processed {
                entry,
                outcome: Outcome::Skipped,
            })
        }
        Disposition::PatchBuildProps => {
            let outcome = patch_build_props(&entry.data);
            info!(path = %entry.path, "rewriting build fingerprint");
            Ok(Processed {
                entry: entry.with_data(outcome.data),
                outcome: Outcome::Patched {
                    warnings: outcome.warnings,
                },
            })
        }
        Disposition::Copy => {
            debug!(path = %entry.path, "copying");
            Ok(Processed {
                entry,
                outcome: Outcome::Copied,
            })
        }
    }
}

/// Transform one window of entries, signing on up to one thread per entry.
/// Results come back in input order.
fn process_window(
    window: Vec<ArchiveEntry>,
    ctx: SigningContext<'_>,
) -> Result<Vec<Processed>, ResignError> {
    let needs_threads = window
        .iter()
        .filter(|e| matches!(classify(&e.path, ctx.certmap), Disposition::Sign { .. }))
        .count()
        > 1;

    if !needs_threads {
        return window
            .into_iter()
            .map(|entry| process_entry(entry, ctx))
            .collect();
    }

    thread::scope(|scope| {
        let handles: Vec<_> = window
            .into_iter()
            .map(|entry| scope.spawn(move || process_entry(entry, ctx)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    })
}

/// Rewrite every entry of `source` into `sink`, in order.
///
/// Packages with a key in `certmap` are re-signed, `SYSTEM/build.prop` is
/// patched, and everything else is copied unchanged. Any failure aborts
/// the run; entries already written to `sink` must then be discarded.
pub fn rewrite_archive(
    source: &mut dyn EntrySource,
    sink: &mut dyn EntrySink,
    certmap: &CertificateMap,
    passwords: &PasswordMap,
    signer: &dyn Signer,
    options: &RewriteOptions,
) -> Result<ResignReport, ResignError> {
    let ctx = SigningContext {
        certmap,
        passwords,
        signer,
        alignment: options.alignment,
    };
    let window_size = options.jobs.max(1);
    let total = source.len();
    let mut report = ResignReport::default();

    let mut start = 0;
    while start < total {
        let end = (start + window_size).min(total);
        let window = (start..end)
            .map(|index| source.read_entry(index))
            .collect::<Result<Vec<_>, _>>()?;

        for processed in process_window(window, ctx)? {
            sink.write_entry(&processed.entry)?;
            let path = processed.entry.path;
            match processed.outcome {
                Outcome::Signed { key } => report.signed.push(SignedPackage { path, key }),
                Outcome::Skipped => report.skipped.push(path),
                Outcome::Patched { warnings } => {
                    report.patched.push(path);
                    report.warnings.extend(warnings);
                }
                Outcome::Copied => report.copied += 1,
            }
        }
        start = end;
    }

    Ok(report)
}

/// Run the whole pipeline against an open target-files archive: resolve
/// keys from `META/apkcerts.txt`, collect passwords, then rewrite.
pub fn resign_target_files(
    source: &mut dyn EntrySource,
    sink: &mut dyn EntrySink,
    config: &ResignConfig,
    provider: &mut dyn PasswordProvider,
    signer: &dyn Signer,
) -> Result<ResignReport, ResignError> {
    let metadata = source
        .read_by_path(APKCERTS_PATH)?
        .ok_or_else(|| ResignError::MissingMetadata(APKCERTS_PATH.to_string()))?;
    let metadata = String::from_utf8_lossy(&metadata);

    let certmap = resolve_certificate_map(&metadata, &config.key_map, &config.extra_packages)?;
    info!(
        packages = certmap.len(),
        keys = certmap.distinct_keys().len(),
        "resolved package keys"
    );

    let passwords = collect_passwords(&certmap, provider)?;

    rewrite_archive(
        source,
        sink,
        &certmap,
        &passwords,
        signer,
        &config.rewrite_options(),
    )
}
