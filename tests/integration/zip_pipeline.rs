//! The pipeline over real zip containers

use std::io::Cursor;

use relsign::archive::{ZipEntrySink, ZipEntrySource};
use relsign::passwords::StaticPasswords;
use relsign::{resign_target_files, ResignConfig};
use zip::CompressionMethod;

use super::helpers::{build_zip, read_zip, recording_signer, APKCERTS_LINE};

#[test]
fn test_zip_round_trip() {
    let input = build_zip(&[
        ("META/apkcerts.txt", APKCERTS_LINE.as_bytes()),
        ("SYSTEM/app/Foo.apk", b"apk payload"),
        ("SYSTEM/app/Other.apk", b"left alone"),
        (
            "SYSTEM/build.prop",
            b"ro.build.description=dev 1 test-keys\nro.build.fingerprint=device/test-keys/1\n",
        ),
        ("SYSTEM/bin/sh", b"\x7fELF"),
    ]);

    let mut source = ZipEntrySource::new(Cursor::new(input.clone())).unwrap();
    let mut sink = ZipEntrySink::new(Cursor::new(Vec::new()));
    let mut config = ResignConfig::new();
    config.add_key_mapping("testkey=releasekey").unwrap();
    config.jobs = 3;
    let mut passwords = StaticPasswords::new().with("releasekey", "pw");

    let report = resign_target_files(
        &mut source,
        &mut sink,
        &config,
        &mut passwords,
        &recording_signer,
    )
    .unwrap();
    let output = sink.finish().unwrap().into_inner();

    assert!(report.warnings.is_empty());

    let before = read_zip(&input);
    let after = read_zip(&output);
    assert_eq!(before.len(), after.len());
    for ((path_in, data_in, method_in), (path_out, data_out, method_out)) in
        before.iter().zip(&after)
    {
        assert_eq!(path_in, path_out);
        assert_eq!(method_in, method_out);
        match path_in.as_str() {
            "SYSTEM/app/Foo.apk" => {
                assert_eq!(data_out, b"SIGNED(releasekey,pw,4):apk payload")
            }
            "SYSTEM/build.prop" => assert_eq!(
                data_out,
                b"ro.build.description=dev 1 release-keys\nro.build.fingerprint=device/release-keys/1\n"
            ),
            _ => assert_eq!(data_in, data_out),
        }
    }
    assert_eq!(after[1].2, CompressionMethod::Stored);
}
