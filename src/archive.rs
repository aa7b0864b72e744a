// src/archive.rs

//! Gzip-compressed tar emission from a resolved overlay
//!
//! Every entry is stamped owner `root:root` and a single per-archive
//! modification time. Member names are the logical paths with the
//! leading separator stripped; the synthesized root reduces to an empty
//! name and is skipped. Modes come from a small policy table:
//! maintainer scripts are executable, generated control-archive
//! metadata is 0644, and data-tree entries keep their source mode.

use crate::control::MAINTAINER_SCRIPTS;
use crate::error::{Error, Result};
use crate::overlay::Overlay;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io;
use std::path::Path;
use tar::{EntryType, Header};
use tracing::debug;

/// Which of the two inner archives is being emitted
///
/// Both archives force owner root:root, symbolic and numeric; the
/// kind selects the mode policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Control,
    Data,
}

/// Generated control-archive members that take mode 0644
const GENERATED_MEMBERS: [&str; 3] = ["control", "md5sums", "conffiles"];

fn member_mode(kind: ArchiveKind, name: &str, source_mode: u32) -> u32 {
    match kind {
        ArchiveKind::Control => {
            if MAINTAINER_SCRIPTS.contains(&name) {
                0o775
            } else if GENERATED_MEMBERS.contains(&name) {
                0o644
            } else {
                source_mode
            }
        }
        ArchiveKind::Data => source_mode,
    }
}

/// Write a gzip-compressed tar archive of `overlay` to `target`
///
/// Entries are emitted in walk order. `mtime` is applied uniformly to
/// every entry; source timestamps are not preserved. Any read or write
/// failure mid-stream is fatal to the whole archive.
pub fn write_tar_gz(
    target: &Path,
    overlay: &Overlay,
    kind: ArchiveKind,
    mtime: u64,
) -> Result<()> {
    let file = File::create(target).map_err(|e| Error::io("create", target, e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = tar::Builder::new(encoder);

    for entry in overlay.walk()? {
        let name = entry.path.trim_start_matches('/');
        if name.is_empty() {
            continue;
        }
        debug!("archiving {}", entry.path);

        let mut header = Header::new_gnu();
        header.set_mtime(mtime);
        header
            .set_username("root")
            .map_err(|e| Error::io("stamp owner on", target, e))?;
        header
            .set_groupname("root")
            .map_err(|e| Error::io("stamp owner on", target, e))?;
        // Numeric uid/gid must always be written: a fresh GNU header
        // leaves the octal fields blank, which readers reject.
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(member_mode(kind, name, entry.mode));

        if entry.is_dir {
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            archive
                .append_data(&mut header, name, io::empty())
                .map_err(|e| Error::io("write entry to", target, e))?;
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_size(entry.size);
            header.set_cksum();
            let reader = overlay.open(&entry.path)?;
            archive
                .append_data(&mut header, name, reader)
                .map_err(|e| Error::io("write entry to", target, e))?;
        }
    }

    let encoder = archive
        .into_inner()
        .map_err(|e| Error::io("finish", target, e))?;
    encoder
        .finish()
        .map_err(|e| Error::io("finish", target, e))?;
    Ok(())
}
