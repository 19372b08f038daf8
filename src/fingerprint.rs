//! Rewrites the signing-status marker in `SYSTEM/build.prop`.

use std::fmt;

use tracing::warn;

/// Path of the build properties inside a target-files archive.
pub const BUILD_PROP_PATH: &str = "SYSTEM/build.prop";

pub const TEST_KEYS_MARKER: &str = "test-keys";
pub const RELEASE_KEYS_MARKER: &str = "release-keys";

/// Properties whose value carries the signing-status marker.
pub const PATCHED_PROPERTIES: [&str; 2] = ["ro.build.fingerprint", "ro.build.description"];

/// Non-fatal condition found while patching build properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintWarning {
    /// The property is set but its value has no `test-keys` marker.
    MarkerMissing { property: String, line: String },
    /// The property does not appear at all.
    PropertyMissing { property: String },
    /// The entry is not valid UTF-8 and was left untouched.
    NotText,
}

impl fmt::Display for FingerprintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintWarning::MarkerMissing { property, line } => write!(
                f,
                "{property} does not contain \"{TEST_KEYS_MARKER}\"; left unchanged: {line}"
            ),
            FingerprintWarning::PropertyMissing { property } => {
                write!(f, "{property} not found; nothing to mark as {RELEASE_KEYS_MARKER}")
            }
            FingerprintWarning::NotText => {
                write!(f, "{BUILD_PROP_PATH} is not valid UTF-8; left unchanged")
            }
        }
    }
}

/// Patched entry contents plus any warnings raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub data: Vec<u8>,
    pub warnings: Vec<FingerprintWarning>,
}

/// Replace `test-keys` with `release-keys` in the fingerprint and
/// description properties. Only the first marker in each property value
/// changes; every other byte is kept.
pub fn patch_build_props(data: &[u8]) -> PatchOutcome {
    let Ok(text) = std::str::from_utf8(data) else {
        let warning = FingerprintWarning::NotText;
        warn!("{warning}");
        return PatchOutcome {
            data: data.to_vec(),
            warnings: vec![warning],
        };
    };

    let mut seen = [false; PATCHED_PROPERTIES.len()];
    let mut warnings = Vec::new();

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| {
            let Some(slot) = property_slot(line) else {
                return line.to_string();
            };
            seen[slot] = true;
            match replace_marker(line) {
                Some(patched) => patched,
                None => {
                    warnings.push(FingerprintWarning::MarkerMissing {
                        property: PATCHED_PROPERTIES[slot].to_string(),
                        line: line.trim_end().to_string(),
                    });
                    line.to_string()
                }
            }
        })
        .collect();

    for (slot, property) in PATCHED_PROPERTIES.iter().enumerate() {
        if !seen[slot] {
            warnings.push(FingerprintWarning::PropertyMissing {
                property: property.to_string(),
            });
        }
    }

    for warning in &warnings {
        warn!("{warning}");
    }

    PatchOutcome {
        data: lines.join("\n").into_bytes(),
        warnings,
    }
}

/// Index into [`PATCHED_PROPERTIES`] for a `key=value` line, if it sets one.
fn property_slot(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let (key, _) = trimmed.split_once('=')?;
    PATCHED_PROPERTIES
        .iter()
        .position(|property| *property == key.trim())
}

fn replace_marker(line: &str) -> Option<String> {
    let value_start = line.find('=')? + 1;
    let offset = line[value_start..].find(TEST_KEYS_MARKER)? + value_start;
    let mut patched = String::with_capacity(line.len() + RELEASE_KEYS_MARKER.len());
    patched.push_str(&line[..offset]);
    patched.push_str(RELEASE_KEYS_MARKER);
    patched.push_str(&line[offset + TEST_KEYS_MARKER.len()..]);
    Some(patched)
}
