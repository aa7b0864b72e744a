//! Reproducibility test under a fixed clock. Lives in its own test
//! binary because it mutates the process-global SOURCE_DATE_EPOCH
//! variable, which must not race other tests.

use debforge::{build_package, Control, PackageFiles};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn metadata() -> Control {
    Control {
        package: "mkdeb".to_string(),
        version: "0.1.0".to_string(),
        architecture: "amd64".to_string(),
        maintainer: "Chris Bednarski <banzaimonkey@gmail.com>".to_string(),
        description: "A CLI tool for building debian packages".to_string(),
        ..Default::default()
    }
}

fn stage(dir: &Path) {
    fs::create_dir_all(dir.join("usr/bin")).unwrap();
    fs::write(dir.join("usr/bin/app"), b"binary").unwrap();
    fs::create_dir_all(dir.join("etc/app")).unwrap();
    fs::write(dir.join("etc/app/app.conf"), b"setting=1\n").unwrap();
    fs::write(dir.join("postinst"), b"#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(dir.join("postinst"), fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_fixed_clock_builds_are_identical() {
    std::env::set_var("SOURCE_DATE_EPOCH", "1700000000");

    let staging = tempfile::TempDir::new().unwrap();
    stage(staging.path());
    let control = metadata();

    let out_a = tempfile::TempDir::new().unwrap();
    let mut files_a = PackageFiles::new();
    files_a.auto_path(staging.path()).unwrap();
    let first = build_package(&control, files_a, out_a.path()).unwrap();

    let out_b = tempfile::TempDir::new().unwrap();
    let mut files_b = PackageFiles::new();
    files_b.auto_path(staging.path()).unwrap();
    let second = build_package(&control, files_b, out_b.path()).unwrap();

    assert_eq!(fs::read(first).unwrap(), fs::read(second).unwrap());
}
