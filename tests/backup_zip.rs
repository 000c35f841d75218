#[path = "../src/backup.rs"]
mod backup;
#[path = "../src/db.rs"]
mod db;

mod common;

use common::temp_dir;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

fn import(in_path: &Path, workspace: &Path) -> anyhow::Result<backup::ImportSummary> {
    let prepared = backup::read_import_file(in_path)?;
    backup::install_import(&prepared, workspace)
}

fn seeded_db(workspace: &Path, student_reference: &str) -> Vec<u8> {
    let conn = db::open_db(workspace).expect("open db");
    conn.execute(
        "INSERT INTO cases(case_id, student_reference, status, progress_status, created_at, version)
         VALUES('c1', ?, 'open', 'no_contact', '2026-09-01T08:00:00.000000Z', 1)",
        [student_reference],
    )
    .expect("seed case");
    drop(conn);
    std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read db")
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("casesync-backup-src");
    let workspace2 = temp_dir("casesync-backup-dst");
    let out_dir = temp_dir("casesync-backup-out");

    let bytes = seeded_db(&workspace, "S-7001");

    let bundle_path = out_dir.join("workspace.casesync.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 3);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/casesync.sqlite3")
        .expect("database entry in bundle");

    let import = import(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join(db::DB_FILE_NAME)).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected() {
    let out_dir = temp_dir("casesync-backup-tampered");
    let workspace = temp_dir("casesync-backup-tampered-dst");

    let bundle_path = out_dir.join("tampered.casesync.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        let manifest = serde_json::json!({
            "format": backup::BUNDLE_FORMAT_V1,
            "dbSha256": "00".repeat(32),
        });
        zip.write_all(manifest.to_string().as_bytes())
            .expect("write manifest");
        zip.start_file("db/casesync.sqlite3", opts).expect("db entry");
        zip.write_all(b"not what the manifest promised")
            .expect("write db");
        zip.finish().expect("finish zip");
    }

    let err = import(&bundle_path, &workspace).expect_err("checksum mismatch");
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!workspace.join(db::DB_FILE_NAME).exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn plain_sqlite_import_is_supported() {
    let out_dir = temp_dir("casesync-backup-plain");
    let workspace = temp_dir("casesync-backup-plain-dst");

    let source = temp_dir("casesync-backup-plain-src");
    let bytes = seeded_db(&source, "S-7002");
    let plain_file = out_dir.join("copy.sqlite3");
    std::fs::write(&plain_file, &bytes).expect("write sqlite file");

    let import = import(&plain_file, &workspace).expect("import sqlite file");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read restored sqlite");
    assert_eq!(restored, bytes);
    assert!(!workspace.join("casesync.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_sqlite_file_is_rejected_and_workspace_kept() {
    let out_dir = temp_dir("casesync-backup-notes");
    let workspace = temp_dir("casesync-backup-notes-dst");
    let before = seeded_db(&workspace, "S-7003");

    let notes = out_dir.join("notes.txt");
    std::fs::write(&notes, "hello, not a database").expect("write notes");

    let err = import(&notes, &workspace).expect_err("text file");
    assert!(format!("{err:#}").contains("not a bundle or sqlite database"));
    let after = std::fs::read(workspace.join(db::DB_FILE_NAME)).expect("read db");
    assert_eq!(after, before);
    assert!(db::open_db(&workspace).is_ok());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
