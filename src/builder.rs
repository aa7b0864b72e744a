// src/builder.rs

//! Package assembly pipeline
//!
//! Linear state machine with no branching except on error: validate
//! metadata, acquire a scoped workspace, collect checksums and sizes
//! from the data tree, render the control file, compose the control
//! overlay, emit both inner archives, then assemble the outer `ar`
//! container with its fixed member order. The workspace is removed on
//! every exit path; its cleanup failure is logged but never masks the
//! build result.

use crate::archive::{self, ArchiveKind};
use crate::control::Control;
use crate::error::{Error, Result};
use crate::files::PackageFiles;
use crate::manifest;
use crate::overlay::{BindMode, MemMap};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// The outer container's magic first member: name and exact payload
const DEBIAN_BINARY: (&str, &[u8]) = ("debian-binary", b"2.0\n");

/// Build a `.deb` package in `target_dir`
///
/// The filename is derived as `{package}-{version}-{architecture}.deb`;
/// the returned path points at the written artifact. `files` is
/// consumed: the build binds generated control content on top of the
/// caller's control overlay.
///
/// Timestamps embedded in the archives come from `SOURCE_DATE_EPOCH`
/// when set, the current wall clock otherwise.
pub fn build_package(
    control: &Control,
    files: PackageFiles,
    target_dir: &Path,
) -> Result<PathBuf> {
    control.validate()?;

    let workspace = tempfile::Builder::new()
        .prefix("debforge-")
        .tempdir()
        .map_err(|e| Error::io("create workspace", std::env::temp_dir(), e))?;
    debug!("build workspace at {}", workspace.path().display());

    let result = assemble(control, files, target_dir, workspace.path());

    let workspace_path = workspace.path().to_path_buf();
    if let Err(err) = workspace.close() {
        warn!(
            "failed to remove build workspace {}: {err}",
            workspace_path.display()
        );
    }
    result
}

fn assemble(
    control: &Control,
    files: PackageFiles,
    target_dir: &Path,
    workspace: &Path,
) -> Result<PathBuf> {
    let mtime = build_timestamp();

    // Collect from the data tree before anything is written; the
    // control file's Installed-Size must describe exactly the file set
    // the data archive will contain.
    let checksums = manifest::md5sums(&files.data)?;
    let conffiles = match files.conffile_patterns() {
        Some(patterns) => Some(manifest::conffiles(&files.data, &patterns)?),
        None => None,
    };
    let installed_size = manifest::installed_size_kb(&files.data)?;
    let control_text = control.render(installed_size);

    // Generated content is bound at After so it always wins a name
    // collision with caller-provided scripts bound at Before.
    let mut generated = MemMap::new();
    generated.insert("/control", control_text);
    generated.insert("/md5sums", checksums);
    if let Some(conffiles) = conffiles {
        generated.insert("/conffiles", conffiles);
    }
    let mut control_overlay = files.control;
    control_overlay.bind(generated, BindMode::After);

    let control_archive = workspace.join("control.tar.gz");
    archive::write_tar_gz(&control_archive, &control_overlay, ArchiveKind::Control, mtime)?;
    let data_archive = workspace.join("data.tar.gz");
    archive::write_tar_gz(&data_archive, &files.data, ArchiveKind::Data, mtime)?;

    fs::create_dir_all(target_dir).map_err(|e| Error::io("create target directory", target_dir, e))?;
    let artifact = target_dir.join(control.deb_filename());
    let output = File::create(&artifact).map_err(|e| Error::io("create", &artifact, e))?;

    let mut container = ar::Builder::new(output);
    let header = member_header(DEBIAN_BINARY.0, DEBIAN_BINARY.1.len() as u64, mtime);
    container
        .append(&header, DEBIAN_BINARY.1)
        .map_err(|e| Error::io("write debian-binary to", &artifact, e))?;
    append_member(&mut container, "control.tar.gz", &control_archive, mtime)?;
    append_member(&mut container, "data.tar.gz", &data_archive, mtime)?;
    container
        .into_inner()
        .map_err(|e| Error::io("finish", &artifact, e))?;

    Ok(artifact)
}

fn member_header(name: &str, size: u64, mtime: u64) -> ar::Header {
    let mut header = ar::Header::new(name.as_bytes().to_vec(), size);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mode(0o600);
    header
}

/// Copy an inner archive into the container, checking that the bytes
/// copied match the declared size
fn append_member<W: std::io::Write>(
    container: &mut ar::Builder<W>,
    name: &str,
    source: &Path,
    mtime: u64,
) -> Result<()> {
    let declared = fs::metadata(source)
        .map_err(|e| Error::io("stat", source, e))?
        .len();
    let file = File::open(source).map_err(|e| Error::io("open", source, e))?;
    let mut reader = CountingReader {
        inner: file,
        count: 0,
    };
    let header = member_header(name, declared, mtime);
    container
        .append(&header, &mut reader)
        .map_err(|e| Error::io("write member to", source, e))?;
    if reader.count != declared {
        return Err(Error::MemberSizeMismatch {
            member: name.to_string(),
            declared,
            written: reader.count,
        });
    }
    Ok(())
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

fn build_timestamp() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        })
}
