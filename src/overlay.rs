// src/overlay.rs

//! Layered virtual filesystem for composing package contents
//!
//! An [`Overlay`] is an ordered list of bindings, each pairing a file
//! source with a precedence rule. Sources are never mutated; precedence
//! only changes which source answers a given path at read time. Walks
//! are resolved against the same rule as single-path opens, so checksum
//! collection and archive emission always agree on the file set.
//!
//! Resolution when several bindings define the same path:
//! - any [`BindMode::Replace`] binding wins (latest Replace among several),
//! - otherwise the most recently added [`BindMode::After`] binding wins,
//! - [`BindMode::Before`] bindings are shadowed by anything added later
//!   at the same or higher precedence.

use crate::error::{Error, Result};
use glob::Pattern;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{Cursor, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use walkdir::WalkDir;

/// Precedence rule for a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    /// Lower priority; later bindings may shadow it
    Before,
    /// Higher priority; shadows earlier bindings
    After,
    /// Unconditionally overrides paths it defines, regardless of
    /// binding order
    Replace,
}

impl BindMode {
    fn tier(self) -> u8 {
        match self {
            BindMode::Before => 0,
            BindMode::After => 1,
            BindMode::Replace => 2,
        }
    }
}

/// One file listed by a source: rooted logical path, size and mode
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub path: String,
    pub size: u64,
    pub mode: u32,
}

/// A provider of files for an overlay binding
///
/// Sources are lazy: a missing or unreadable underlying path surfaces
/// when it is walked or opened, not when it is bound.
pub trait Source {
    /// Enumerate every file this source defines. Paths are rooted,
    /// `/`-separated and case-sensitive. Directories are not listed;
    /// the overlay synthesizes them from file paths.
    fn entries(&self) -> Result<Vec<SourceEntry>>;

    /// Whether this source defines `path`
    fn contains(&self, path: &str) -> bool;

    /// Open `path` for reading
    fn open(&self, path: &str) -> Result<Box<dyn Read>>;
}

/// One resolved node of a walked overlay
#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    /// Rooted logical path
    pub path: String,
    pub is_dir: bool,
    /// Size in bytes; 0 for directories
    pub size: u64,
    /// Source-reported mode bits; 0o755 for synthesized directories
    pub mode: u32,
}

struct Binding {
    source: Box<dyn Source>,
    mode: BindMode,
}

/// Layered composition of file sources with deterministic conflict
/// resolution
#[derive(Default)]
pub struct Overlay {
    bindings: Vec<Binding>,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source at the given precedence
    pub fn bind(&mut self, source: impl Source + 'static, mode: BindMode) {
        self.bindings.push(Binding {
            source: Box::new(source),
            mode,
        });
    }

    /// Walk the union of all bound paths in depth-first lexicographic
    /// order, with exactly one winning source per path
    pub fn walk(&self) -> Result<Vec<ResolvedEntry>> {
        // (tier, binding index) orders winners: Replace beats After
        // beats Before, later bindings beat earlier ones within a tier
        let mut winners: HashMap<String, ((u8, usize), SourceEntry)> = HashMap::new();
        for (index, binding) in self.bindings.iter().enumerate() {
            let key = (binding.mode.tier(), index);
            for entry in binding.source.entries()? {
                let dominated = winners
                    .get(&entry.path)
                    .is_some_and(|(existing, _)| *existing > key);
                if !dominated {
                    winners.insert(entry.path.clone(), (key, entry));
                }
            }
        }

        let mut directories = BTreeSet::new();
        for path in winners.keys() {
            let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
            for depth in 1..components.len() {
                directories.insert(format!("/{}", components[..depth].join("/")));
            }
        }

        let mut resolved = Vec::with_capacity(winners.len() + directories.len());
        for dir in directories {
            resolved.push(ResolvedEntry {
                path: dir,
                is_dir: true,
                size: 0,
                mode: 0o755,
            });
        }
        for (_, entry) in winners.into_values() {
            resolved.push(ResolvedEntry {
                path: entry.path,
                is_dir: false,
                size: entry.size,
                mode: entry.mode,
            });
        }
        resolved.sort_by(|a, b| a.path.split('/').cmp(b.path.split('/')));
        Ok(resolved)
    }

    /// Resolve a single path to a byte stream using the same precedence
    /// rule as [`walk`](Self::walk)
    pub fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        let mut winner: Option<((u8, usize), &Binding)> = None;
        for (index, binding) in self.bindings.iter().enumerate() {
            if !binding.source.contains(path) {
                continue;
            }
            let key = (binding.mode.tier(), index);
            match winner {
                Some((existing, _)) if existing > key => {}
                _ => winner = Some((key, binding)),
            }
        }
        match winner {
            Some((_, binding)) => binding.source.open(path),
            None => Err(Error::PathNotFound {
                path: path.to_string(),
            }),
        }
    }
}

fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// A directory on disk, mapped to the overlay root
///
/// An empty directory that contains no files contributes nothing to
/// the overlay.
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn disk_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Source for DirSource {
    fn entries(&self) -> Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        for step in WalkDir::new(&self.root).follow_links(true) {
            let step = step.map_err(|e| Error::io("walk", &self.root, e.into()))?;
            if !step.file_type().is_file() {
                continue;
            }
            let metadata = step
                .metadata()
                .map_err(|e| Error::io("stat", step.path(), e.into()))?;
            let relative = step
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(step.path())
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(SourceEntry {
                path: rooted(&relative),
                size: metadata.len(),
                mode: metadata.permissions().mode() & 0o7777,
            });
        }
        Ok(entries)
    }

    fn contains(&self, path: &str) -> bool {
        self.disk_path(path).is_file()
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        let disk = self.disk_path(path);
        let file = File::open(&disk).map_err(|e| Error::io("open", disk, e))?;
        Ok(Box::new(file))
    }
}

/// Individual files on disk mapped to explicit logical paths
#[derive(Default)]
pub struct FileMap {
    mappings: BTreeMap<String, PathBuf>,
}

impl FileMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a logical install path to a source file on disk
    pub fn insert(&mut self, path: impl AsRef<str>, source: impl Into<PathBuf>) {
        self.mappings.insert(rooted(path.as_ref()), source.into());
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Source for FileMap {
    fn entries(&self) -> Result<Vec<SourceEntry>> {
        let mut entries = Vec::with_capacity(self.mappings.len());
        for (path, source) in &self.mappings {
            let metadata =
                std::fs::metadata(source).map_err(|e| Error::io("stat", source, e))?;
            entries.push(SourceEntry {
                path: path.clone(),
                size: metadata.len(),
                mode: metadata.permissions().mode() & 0o7777,
            });
        }
        Ok(entries)
    }

    fn contains(&self, path: &str) -> bool {
        self.mappings.contains_key(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        let source = self
            .mappings
            .get(path)
            .ok_or_else(|| Error::PathNotFound {
                path: path.to_string(),
            })?;
        let file = File::open(source).map_err(|e| Error::io("open", source, e))?;
        Ok(Box::new(file))
    }
}

/// In-memory generated content mapped to logical paths
///
/// Entries report mode 0644; the archive assembler's policy table is
/// responsible for the final member mode.
#[derive(Default)]
pub struct MemMap {
    contents: BTreeMap<String, Vec<u8>>,
}

impl MemMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl AsRef<str>, content: impl Into<Vec<u8>>) {
        self.contents.insert(rooted(path.as_ref()), content.into());
    }
}

impl Source for MemMap {
    fn entries(&self) -> Result<Vec<SourceEntry>> {
        Ok(self
            .contents
            .iter()
            .map(|(path, content)| SourceEntry {
                path: path.clone(),
                size: content.len() as u64,
                mode: 0o644,
            })
            .collect())
    }

    fn contains(&self, path: &str) -> bool {
        self.contents.contains_key(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        let content = self
            .contents
            .get(path)
            .ok_or_else(|| Error::PathNotFound {
                path: path.to_string(),
            })?;
        Ok(Box::new(Cursor::new(content.clone())))
    }
}

/// Filter wrapping a source so that paths matching any exclusion glob
/// are omitted from that source's contribution before overlay
/// composition. One source's exclusions never leak into another
/// source's namespace.
pub struct Exclude<S> {
    inner: S,
    patterns: Vec<Pattern>,
}

impl<S: Source> Exclude<S> {
    pub fn new<P: AsRef<str>>(inner: S, patterns: &[P]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| Error::Pattern {
                    pattern: p.as_ref().to_string(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { inner, patterns })
    }

    fn excluded(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

impl<S: Source> Source for Exclude<S> {
    fn entries(&self) -> Result<Vec<SourceEntry>> {
        Ok(self
            .inner
            .entries()?
            .into_iter()
            .filter(|e| !self.excluded(&e.path))
            .collect())
    }

    fn contains(&self, path: &str) -> bool {
        !self.excluded(path) && self.inner.contains(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read>> {
        if self.excluded(path) {
            return Err(Error::PathNotFound {
                path: path.to_string(),
            });
        }
        self.inner.open(path)
    }
}

/// Read an overlay file fully into memory. Test helper shared across
/// modules.
#[cfg(test)]
pub(crate) fn read_all(overlay: &Overlay, path: &str) -> Result<Vec<u8>> {
    let mut reader = overlay.open(path)?;
    let mut buffer = Vec::new();
    reader
        .read_to_end(&mut buffer)
        .map_err(|e| Error::io("read", std::path::Path::new(path), e))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(pairs: &[(&str, &str)]) -> MemMap {
        let mut map = MemMap::new();
        for (path, content) in pairs {
            map.insert(*path, content.as_bytes());
        }
        map
    }

    #[test]
    fn test_after_shadows_before() {
        let mut overlay = Overlay::new();
        overlay.bind(mem(&[("/etc/x", "before")]), BindMode::Before);
        overlay.bind(mem(&[("/etc/x", "after")]), BindMode::After);

        let content = read_all(&overlay, "/etc/x").unwrap();
        assert_eq!(content, b"after");
    }

    #[test]
    fn test_replace_wins_regardless_of_order() {
        let mut overlay = Overlay::new();
        overlay.bind(mem(&[("/etc/x", "replace")]), BindMode::Replace);
        overlay.bind(mem(&[("/etc/x", "before")]), BindMode::Before);
        overlay.bind(mem(&[("/etc/x", "after")]), BindMode::After);

        let content = read_all(&overlay, "/etc/x").unwrap();
        assert_eq!(content, b"replace");
    }

    #[test]
    fn test_latest_after_wins() {
        let mut overlay = Overlay::new();
        overlay.bind(mem(&[("/a", "first")]), BindMode::After);
        overlay.bind(mem(&[("/a", "second")]), BindMode::After);

        assert_eq!(read_all(&overlay, "/a").unwrap(), b"second");
    }

    #[test]
    fn test_walk_synthesizes_directories_in_order() {
        let mut overlay = Overlay::new();
        overlay.bind(
            mem(&[("/usr/bin/app", "x"), ("/etc/app/app.conf", "y")]),
            BindMode::After,
        );

        let paths: Vec<String> = overlay.walk().unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(
            paths,
            vec![
                "/etc",
                "/etc/app",
                "/etc/app/app.conf",
                "/usr",
                "/usr/bin",
                "/usr/bin/app",
            ]
        );
    }

    #[test]
    fn test_walk_reports_one_winner_per_path() {
        let mut overlay = Overlay::new();
        overlay.bind(mem(&[("/a", "lo"), ("/b", "only")]), BindMode::Before);
        overlay.bind(mem(&[("/a", "high")]), BindMode::After);

        let entries = overlay.walk().unwrap();
        let files: Vec<&ResolvedEntry> = entries.iter().filter(|e| !e.is_dir).collect();
        assert_eq!(files.len(), 2);
        let a = files.iter().find(|e| e.path == "/a").unwrap();
        assert_eq!(a.size, 4); // "high"
    }

    #[test]
    fn test_exclude_filters_before_composition() {
        let mut overlay = Overlay::new();
        let filtered = Exclude::new(
            mem(&[("/preinst", "s"), ("/usr/bin/app", "x")]),
            &["/preinst"],
        )
        .unwrap();
        overlay.bind(filtered, BindMode::Before);
        // A different binding still provides /preinst in its own namespace
        overlay.bind(mem(&[("/preinst", "other")]), BindMode::Before);

        assert_eq!(read_all(&overlay, "/preinst").unwrap(), b"other");
        let paths: Vec<String> = overlay.walk().unwrap().into_iter().map(|e| e.path).collect();
        assert!(paths.contains(&"/usr/bin/app".to_string()));
        assert!(paths.contains(&"/preinst".to_string()));
    }

    #[test]
    fn test_open_missing_path() {
        let overlay = Overlay::new();
        // The Ok side is an opaque reader, so take the error out with
        // a match instead of unwrap_err
        let err = match overlay.open("/nope") {
            Ok(_) => panic!("expected open to fail for an unbound path"),
            Err(err) => err,
        };
        assert!(matches!(err, Error::PathNotFound { .. }));
    }

    #[test]
    fn test_dir_source_missing_root_fails_at_walk() {
        let mut overlay = Overlay::new();
        overlay.bind(DirSource::new("/definitely/not/here"), BindMode::After);
        assert!(overlay.walk().is_err());
    }

    #[test]
    fn test_dir_source_lists_files_rooted() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("usr/bin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("tool"), b"#!/bin/sh\n").unwrap();

        let source = DirSource::new(dir.path());
        let entries = source.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/usr/bin/tool");
        assert_eq!(entries[0].size, 10);
        assert!(source.contains("/usr/bin/tool"));
        assert!(!source.contains("/usr/bin"));
    }

    #[test]
    fn test_file_map_missing_source_fails_at_walk() {
        let mut map = FileMap::new();
        map.insert("/usr/bin/tool", "/no/such/file");
        assert!(map.entries().is_err());
    }
}
