//! End-to-end runs over in-memory archives

use relsign::error::{ParseError, ResignError};
use relsign::passwords::StaticPasswords;
use relsign::{resign_target_files, MemoryArchive, ResignConfig};

use super::helpers::{recording_signer, sample_entries, APKCERTS_LINE};

fn release_config() -> ResignConfig {
    let mut config = ResignConfig::new();
    config.add_key_mapping("testkey=releasekey").unwrap();
    config
}

#[test]
fn test_resigns_package_and_patches_fingerprint() {
    let mut source = MemoryArchive::from(sample_entries(APKCERTS_LINE));
    let mut sink = MemoryArchive::new();
    let mut passwords = StaticPasswords::new().with("releasekey", "pw");

    let report = resign_target_files(
        &mut source,
        &mut sink,
        &release_config(),
        &mut passwords,
        &recording_signer,
    )
    .unwrap();

    assert_eq!(sink.entries().len(), source.entries().len());
    assert_eq!(sink.paths(), source.paths());

    let original_apk = &source.get("SYSTEM/app/Foo.apk").unwrap().data;
    let expected_apk = recording_signer(original_apk, "releasekey", "pw", 4).unwrap();
    assert_eq!(sink.get("SYSTEM/app/Foo.apk").unwrap().data, expected_apk);

    assert_eq!(
        sink.get("SYSTEM/build.prop").unwrap().data,
        b"ro.build.fingerprint=device/release-keys/1"
    );
    assert_eq!(
        sink.get("META/apkcerts.txt").unwrap(),
        source.get("META/apkcerts.txt").unwrap()
    );

    assert_eq!(report.signed.len(), 1);
    assert_eq!(report.signed[0].key, "releasekey");
    // build.prop in the sample has no description property
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn test_mismatched_stems_abort_before_writing() {
    let apkcerts = r#"name="Foo.apk" certificate="a.x509.pem" private_key="b.pk8""#;
    let mut source = MemoryArchive::from(sample_entries(apkcerts));
    let mut sink = MemoryArchive::new();
    let mut passwords = StaticPasswords::new().with("releasekey", "pw");

    let err = resign_target_files(
        &mut source,
        &mut sink,
        &release_config(),
        &mut passwords,
        &recording_signer,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        ResignError::Parse(ParseError::MismatchedKeyPair { .. })
    ));
    assert!(sink.entries().is_empty());
}

#[test]
fn test_extra_package_override() {
    let mut source = MemoryArchive::from(sample_entries(APKCERTS_LINE));
    let mut sink = MemoryArchive::new();
    let mut config = release_config();
    config.add_extra_packages("Foo.apk=platform").unwrap();
    let mut passwords = StaticPasswords::new().with("platform", "platform-pw");

    let report = resign_target_files(
        &mut source,
        &mut sink,
        &config,
        &mut passwords,
        &recording_signer,
    )
    .unwrap();

    assert_eq!(report.signed[0].key, "platform");
    assert!(sink
        .get("SYSTEM/app/Foo.apk")
        .unwrap()
        .data
        .starts_with(b"SIGNED(platform,platform-pw,4):"));
}

#[test]
fn test_package_without_key_passes_through() {
    let mut entries = sample_entries(APKCERTS_LINE);
    entries.push(relsign::ArchiveEntry::new(
        "SYSTEM/app/Presigned.apk",
        b"vendor signed".to_vec(),
        relsign::EntryMetadata::stored(),
    ));
    let mut source = MemoryArchive::from(entries);
    let mut sink = MemoryArchive::new();
    let mut passwords = StaticPasswords::new().with("releasekey", "pw");

    let report = resign_target_files(
        &mut source,
        &mut sink,
        &release_config(),
        &mut passwords,
        &recording_signer,
    )
    .unwrap();

    assert_eq!(report.skipped, vec!["SYSTEM/app/Presigned.apk"]);
    assert_eq!(
        sink.get("SYSTEM/app/Presigned.apk").unwrap(),
        source.get("SYSTEM/app/Presigned.apk").unwrap()
    );
}
