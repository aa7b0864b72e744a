// src/files.rs

//! Package file-set composition
//!
//! [`PackageFiles`] pairs the data overlay (the installed tree) with
//! the control overlay (maintainer scripts) and the conffile glob set.
//! Maintainer scripts are excluded from the data tree at bind time, by
//! filtering the provider before overlay composition, so the exclusion
//! never leaks into other bindings.

use crate::control::MAINTAINER_SCRIPTS;
use crate::error::{Error, Result};
use crate::manifest::{DEFAULT_CONFFILE_GLOBS, DISABLE_CONFFILES};
use crate::overlay::{BindMode, DirSource, Exclude, FileMap, Overlay};
use std::fs;
use std::path::PathBuf;

/// The file inputs to a package build
#[derive(Default)]
pub struct PackageFiles {
    /// Overlay for the data archive (the installed file tree)
    pub data: Overlay,
    /// Overlay for the control archive (maintainer scripts; generated
    /// metadata is bound on top by the builder)
    pub control: Overlay,
    /// Conffile glob patterns. Empty means the default `/etc/*/**`; a
    /// single `-` disables conffile generation entirely.
    pub conffiles: Vec<String>,
}

impl PackageFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a staging directory as the package's installed tree
    ///
    /// Maintainer scripts (`preinst`, `postinst`, `prerm`, `postrm`) at
    /// the directory root are kept out of the data tree; any that exist
    /// on disk are mapped into the control overlay instead.
    pub fn auto_path(&mut self, dir: impl Into<PathBuf>) -> Result<()> {
        let dir = dir.into();
        let metadata = fs::metadata(&dir).map_err(|e| Error::io("stat auto path", &dir, e))?;
        if !metadata.is_dir() {
            return Err(Error::NotADirectory { path: dir });
        }

        let excluded: Vec<String> = MAINTAINER_SCRIPTS
            .iter()
            .map(|name| format!("/{name}"))
            .collect();
        let source = Exclude::new(DirSource::new(&dir), &excluded)?;
        self.data.bind(source, BindMode::Before);

        let mut scripts = FileMap::new();
        for name in MAINTAINER_SCRIPTS {
            let candidate = dir.join(name);
            if candidate.is_file() {
                scripts.insert(format!("/{name}"), candidate);
            }
        }
        if !scripts.is_empty() {
            self.control.bind(scripts, BindMode::Before);
        }
        Ok(())
    }

    /// Map individual source files to explicit install paths in the
    /// data tree
    pub fn map_files<I, P>(&mut self, mappings: I)
    where
        I: IntoIterator<Item = (String, P)>,
        P: Into<PathBuf>,
    {
        let mut map = FileMap::new();
        for (install_path, source) in mappings {
            map.insert(install_path, source);
        }
        if !map.is_empty() {
            self.data.bind(map, BindMode::Before);
        }
    }

    /// Map one source file to an install path in the data tree
    pub fn map_file(&mut self, install_path: impl AsRef<str>, source: impl Into<PathBuf>) {
        self.map_files([(install_path.as_ref().to_string(), source.into())]);
    }

    /// Effective conffile glob set: `None` when generation is disabled
    /// by the `-` sentinel
    pub fn conffile_patterns(&self) -> Option<Vec<String>> {
        if self.conffiles.iter().any(|p| p == DISABLE_CONFFILES) {
            return None;
        }
        if self.conffiles.is_empty() {
            return Some(DEFAULT_CONFFILE_GLOBS.iter().map(|p| p.to_string()).collect());
        }
        Some(self.conffiles.clone())
    }
}
