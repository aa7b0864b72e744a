// src/lib.rs

//! Debforge
//!
//! Programmable assembly of Debian binary packages (`.deb`) for build
//! pipelines that need a reproducible alternative to shell-script
//! packaging tools.
//!
//! # Architecture
//!
//! - Overlay filesystem: file sources composed into one logical tree
//!   with deterministic conflict resolution
//! - Control model: typed package metadata, validated and rendered as
//!   canonical control-file text
//! - Two-level archives: gzip-compressed tars nested in an `ar`
//!   container, byte-exact for `dpkg` interoperability
//!
//! The pipeline is single-threaded and synchronous; each step has a
//! strict data dependency on the previous one. A run either completes
//! or fails outright, with the build workspace removed on every exit
//! path.

pub mod archive;
pub mod builder;
pub mod control;
mod error;
pub mod files;
pub mod manifest;
pub mod overlay;

pub use archive::ArchiveKind;
pub use builder::build_package;
pub use control::{Control, MAINTAINER_SCRIPTS, SUPPORTED_ARCHITECTURES};
pub use error::{Error, Result};
pub use files::PackageFiles;
pub use overlay::{
    BindMode, DirSource, Exclude, FileMap, MemMap, Overlay, ResolvedEntry, Source, SourceEntry,
};
