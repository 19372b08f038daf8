//! Tests that drive the relsign binary

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use super::helpers::{build_zip, read_zip};

fn relsign() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_relsign"));
    cmd.env_remove("ANDROID_PW_FILE").env("NO_COLOR", "1");
    cmd
}

fn write_input(dir: &Path, apkcerts: &str) -> std::path::PathBuf {
    let input = dir.join("target_files.zip");
    fs::write(
        &input,
        build_zip(&[
            ("META/apkcerts.txt", apkcerts.as_bytes()),
            ("SYSTEM/app/Foo.apk", b"apk payload"),
            ("SYSTEM/build.prop", b"ro.build.fingerprint=device/test-keys/1\n"),
        ]),
    )
    .expect("Failed to write input zip");
    input
}

#[test]
fn test_parse_error_exits_nonzero_without_output() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(
        temp_dir.path(),
        r#"name="Foo.apk" certificate="a.x509.pem" private_key="b.pk8""#,
    );
    let output = temp_dir.path().join("signed.zip");

    let result = relsign()
        .args(["-s", "signapk.jar", "--java", "/bin/false"])
        .arg(&input)
        .arg(&output)
        .output()
        .expect("Failed to run relsign");

    assert!(!result.status.success());
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(stderr.contains("do not share a stem"), "stderr: {stderr}");
    assert!(!output.exists());
    // No staging file left behind either
    let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".relsign-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_missing_input_exits_nonzero() {
    let temp_dir = TempDir::new().unwrap();
    let result = relsign()
        .args(["-s", "signapk.jar", "--java", "/bin/false"])
        .arg(temp_dir.path().join("absent.zip"))
        .arg(temp_dir.path().join("out.zip"))
        .output()
        .expect("Failed to run relsign");

    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("Failed to open"));
}

#[cfg(unix)]
#[test]
fn test_full_run_with_stub_signapk() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let input = write_input(
        temp_dir.path(),
        r#"name="Foo.apk" certificate="testkey.x509.pem" private_key="testkey.pk8""#,
    );
    let output = temp_dir.path().join("signed.zip");

    // Stands in for `java`: -Xmx.. -jar JAR CERT KEY IN OUT, password on stdin
    let fake_java = temp_dir.path().join("fake-java");
    fs::write(
        &fake_java,
        "#!/bin/sh\nread pw\n{ cat \"$6\"; printf ':%s:%s' \"$4\" \"$pw\"; } > \"$7\"\n",
    )
    .unwrap();
    fs::set_permissions(&fake_java, fs::Permissions::from_mode(0o755)).unwrap();

    let password_file = temp_dir.path().join("passwords");
    fs::write(&password_file, "[[[ hunter2 ]]] releasekey\n").unwrap();

    let result = relsign()
        .args(["-s", "signapk.jar", "-k", "testkey=releasekey", "-j", "2"])
        .arg("--java")
        .arg(&fake_java)
        .arg("--password-file")
        .arg(&password_file)
        .arg(&input)
        .arg(&output)
        .output()
        .expect("Failed to run relsign");

    assert!(
        result.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&result.stderr)
    );

    let entries = read_zip(&fs::read(&output).unwrap());
    let paths: Vec<&str> = entries.iter().map(|(p, _, _)| p.as_str()).collect();
    assert_eq!(
        paths,
        vec!["META/apkcerts.txt", "SYSTEM/app/Foo.apk", "SYSTEM/build.prop"]
    );
    assert_eq!(entries[1].1, b"apk payload:releasekey.x509.pem:hunter2");
    assert_eq!(entries[2].1, b"ro.build.fingerprint=device/release-keys/1\n");
}
