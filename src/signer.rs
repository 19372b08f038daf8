//! The external package signer.
//!
//! Signature computation is delegated to `signapk.jar`; this module only
//! stages files, runs the tools and reads the result back.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::SignerError;

/// Zip alignment applied to every signed package.
pub const PACKAGE_ALIGNMENT: u32 = 4;

pub const DEFAULT_JAVA_HEAP: &str = "512m";

/// Signs one package with one key.
///
/// Implementations must be shareable across signing threads.
pub trait Signer: Sync {
    fn sign(
        &self,
        unsigned: &[u8],
        key: &str,
        password: &str,
        alignment: u32,
    ) -> Result<Vec<u8>, SignerError>;
}

impl<F> Signer for F
where
    F: Fn(&[u8], &str, &str, u32) -> Result<Vec<u8>, SignerError> + Sync,
{
    fn sign(
        &self,
        unsigned: &[u8],
        key: &str,
        password: &str,
        alignment: u32,
    ) -> Result<Vec<u8>, SignerError> {
        self(unsigned, key, password, alignment)
    }
}

/// Runs `java -jar signapk.jar`, then `zipalign` when one is configured.
///
/// A key identity `K` names the pair `K.x509.pem` / `K.pk8`.
#[derive(Debug, Clone)]
pub struct SignApkSigner {
    java: PathBuf,
    java_heap: String,
    signapk_jar: PathBuf,
    zipalign: Option<PathBuf>,
}

impl SignApkSigner {
    pub fn new(signapk_jar: impl Into<PathBuf>) -> Self {
        Self {
            java: PathBuf::from("java"),
            java_heap: DEFAULT_JAVA_HEAP.to_string(),
            signapk_jar: signapk_jar.into(),
            zipalign: None,
        }
    }

    pub fn java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = java.into();
        self
    }

    pub fn java_heap(mut self, heap: impl Into<String>) -> Self {
        self.java_heap = heap.into();
        self
    }

    pub fn zipalign(mut self, zipalign: Option<PathBuf>) -> Self {
        self.zipalign = zipalign;
        self
    }

    fn signapk_command(&self, key: &str, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.java);
        cmd.arg(format!("-Xmx{}", self.java_heap))
            .arg("-jar")
            .arg(&self.signapk_jar)
            .arg(format!("{key}.x509.pem"))
            .arg(format!("{key}.pk8"))
            .arg(input)
            .arg(output);
        cmd
    }
}

impl Signer for SignApkSigner {
    fn sign(
        &self,
        unsigned: &[u8],
        key: &str,
        password: &str,
        alignment: u32,
    ) -> Result<Vec<u8>, SignerError> {
        if key.trim().is_empty() {
            return Err(SignerError::Rejected {
                key: key.to_string(),
                reason: "empty key identity".to_string(),
            });
        }

        let workspace = tempfile::Builder::new()
            .prefix("relsign-")
            .tempdir()
            .map_err(SignerError::Workspace)?;
        let unsigned_path = workspace.path().join("unsigned.apk");
        let signed_path = workspace.path().join("signed.apk");
        fs::write(&unsigned_path, unsigned).map_err(SignerError::Workspace)?;

        run_tool(
            self.signapk_command(key, &unsigned_path, &signed_path),
            "signapk",
            Some(password),
        )?;

        let result_path = match &self.zipalign {
            Some(zipalign) => {
                let aligned_path = workspace.path().join("aligned.apk");
                let mut cmd = Command::new(zipalign);
                cmd.arg("-f")
                    .arg(alignment.to_string())
                    .arg(&signed_path)
                    .arg(&aligned_path);
                run_tool(cmd, "zipalign", None)?;
                aligned_path
            }
            None => signed_path,
        };

        let signed = fs::read(&result_path).map_err(SignerError::Workspace)?;
        debug!(key, sha256 = %sha256_hex(&signed), "package signed");
        Ok(signed)
    }
}

/// Run a tool to completion, feeding `stdin_line` plus a newline on stdin.
fn run_tool(mut cmd: Command, tool: &str, stdin_line: Option<&str>) -> Result<(), SignerError> {
    let launch = |source| SignerError::Launch {
        tool: tool.to_string(),
        source,
    };

    let mut child = cmd
        .stdin(if stdin_line.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(launch)?;

    if let (Some(line), Some(mut stdin)) = (stdin_line, child.stdin.take()) {
        // A tool that exits without reading stdin is judged by its exit status
        match stdin.write_all(format!("{line}\n").as_bytes()) {
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(launch(e)),
            _ => {}
        }
    }

    let output = child.wait_with_output().map_err(launch)?;
    if !output.status.success() {
        return Err(SignerError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Locate a tool on `PATH` unless it is already given as a path.
pub fn resolve_tool(tool: &Path) -> Result<PathBuf, SignerError> {
    if tool.components().count() > 1 {
        return Ok(tool.to_path_buf());
    }
    which::which(tool).map_err(|e| SignerError::Launch {
        tool: tool.display().to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
    })
}

/// Hex-encoded SHA-256, for logging what was written.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}
