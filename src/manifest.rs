// src/manifest.rs

//! Checksum, conffile and installed-size collection
//!
//! Walks a resolved data tree to produce the generated control-archive
//! members: the `md5sums` checksum manifest, the `conffiles` list of
//! user-editable configuration paths, and the `Installed-Size` total.
//! All three consume [`Overlay::walk`], the single walk definition the
//! archive assembler also uses, so the measured file set always matches
//! the emitted one.

use crate::error::{Error, Result};
use crate::overlay::Overlay;
use glob::Pattern;
use md5::{Digest, Md5};
use std::io;
use std::path::Path;

/// Default conffile glob set when the caller supplies none
pub const DEFAULT_CONFFILE_GLOBS: [&str; 1] = ["/etc/*/**"];

/// Sentinel pattern that disables conffile manifest generation
pub const DISABLE_CONFFILES: &str = "-";

/// Produce the `md5sums` manifest: one `{hex}  {path}` line per file
/// in walk order
pub fn md5sums(data: &Overlay) -> Result<String> {
    let mut out = String::new();
    for entry in data.walk()? {
        if entry.is_dir {
            continue;
        }
        let mut reader = data.open(&entry.path)?;
        let mut hasher = Md5::new();
        io::copy(&mut reader, &mut hasher)
            .map_err(|e| Error::io("checksum", Path::new(&entry.path), e))?;
        out.push_str(&format!("{}  {}\n", hex::encode(hasher.finalize()), entry.path));
    }
    Ok(out)
}

/// Produce the `conffiles` manifest: every file path matching any of
/// the glob patterns, one per line. The content is always terminated by
/// a trailing blank line, even when no path matches.
///
/// `**` in a pattern matches across directory separators, so the
/// default `/etc/*/**` covers arbitrarily nested configuration
/// directories such as `/etc/app/conf.d/10-main.conf`.
pub fn conffiles<P: AsRef<str>>(data: &Overlay, patterns: &[P]) -> Result<String> {
    let compiled = patterns
        .iter()
        .map(|p| {
            Pattern::new(p.as_ref()).map_err(|e| Error::Pattern {
                pattern: p.as_ref().to_string(),
                source: e,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = String::new();
    for entry in data.walk()? {
        if entry.is_dir {
            continue;
        }
        if compiled.iter().any(|p| p.matches(&entry.path)) {
            out.push_str(&entry.path);
            out.push('\n');
        }
    }
    out.push('\n');
    Ok(out)
}

/// Total size of all files in the data tree, in kilobytes with any
/// remainder rounded up
pub fn installed_size_kb(data: &Overlay) -> Result<u64> {
    let mut total: u64 = 0;
    for entry in data.walk()? {
        if !entry.is_dir {
            total += entry.size;
        }
    }
    Ok(total.div_ceil(1024))
}
