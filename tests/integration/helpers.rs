//! Shared test helpers for building and inspecting target-files archives

use std::io::{Cursor, Read, Write};

use relsign::error::SignerError;
use relsign::{ArchiveEntry, EntryMetadata};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

pub const APKCERTS_LINE: &str =
    r#"name="Foo.apk" certificate="testkey.x509.pem" private_key="testkey.pk8""#;

/// Test helper: the canonical three-entry target-files layout
pub fn sample_entries(apkcerts: &str) -> Vec<ArchiveEntry> {
    vec![
        ArchiveEntry::new(
            "META/apkcerts.txt",
            apkcerts.as_bytes().to_vec(),
            EntryMetadata::deflated(),
        ),
        ArchiveEntry::new(
            "SYSTEM/app/Foo.apk",
            vec![0x50, 0x4b, 0x03, 0x04, 0xde, 0xad, 0xbe, 0xef],
            EntryMetadata::stored(),
        ),
        ArchiveEntry::new(
            "SYSTEM/build.prop",
            b"ro.build.fingerprint=device/test-keys/1".to_vec(),
            EntryMetadata::deflated(),
        ),
    ]
}

/// Test helper: signer that prefixes the payload with key and password
pub fn recording_signer(
    data: &[u8],
    key: &str,
    password: &str,
    alignment: u32,
) -> Result<Vec<u8>, SignerError> {
    let mut out = format!("SIGNED({key},{password},{alignment}):").into_bytes();
    out.extend_from_slice(data);
    Ok(out)
}

/// Test helper: write `(path, data)` pairs into an in-memory zip
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let stamp = DateTime::from_date_and_time(2009, 1, 1, 0, 0, 0).expect("valid timestamp");
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data) in entries {
        let method = if path.ends_with(".apk") {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        writer
            .start_file(
                *path,
                SimpleFileOptions::default()
                    .compression_method(method)
                    .last_modified_time(stamp)
                    .unix_permissions(0o644),
            )
            .expect("Failed to start zip entry");
        writer.write_all(data).expect("Failed to write zip entry");
    }
    writer
        .finish()
        .expect("Failed to finish zip")
        .into_inner()
}

/// Test helper: read every entry of a zip as `(path, data, compression)`
pub fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>, CompressionMethod)> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("Failed to open zip");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).expect("Failed to read zip entry");
            let mut data = Vec::new();
            file.read_to_end(&mut data).expect("Failed to read zip data");
            (file.name().to_string(), data, file.compression())
        })
        .collect()
}
