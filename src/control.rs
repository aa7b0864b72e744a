// src/control.rs

//! Debian binary control file model
//!
//! Typed representation of package metadata with syntax validation and
//! deterministic rendering of the canonical control-file text. Field
//! order is fixed and empty optional fields are omitted entirely; an
//! empty `Key:` line in the output would be a rendering defect.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Maintainer script names recognized in the control archive
pub const MAINTAINER_SCRIPTS: [&str; 4] = ["preinst", "postinst", "prerm", "postrm"];

/// Architectures accepted by `validate()`. `all` is used for
/// non-binary packages.
pub const SUPPORTED_ARCHITECTURES: [&str; 11] = [
    "all", "amd64", "arm64", "armel", "armhf", "i386", "mips", "mipsel", "powerpc", "ppc64el",
    "s390x",
];

static DEPENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.+_-]+( \((=|>=|<=|>|<) ([0-9][0-9a-zA-Z.-]*)\))?$")
        .expect("hard-coded dependency grammar")
});

static RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.+_-]+( \(<< ([0-9][0-9a-zA-Z.-]*)\))?$")
        .expect("hard-coded relation grammar")
});

/// Debian binary control file fields
///
/// Constructed once from an external package spec, validated, then
/// consumed to render the control file. `priority` defaults to
/// `optional` at render and validation time; the default is never
/// written back into this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Control {
    // Required fields
    pub package: String,
    pub version: String,
    pub architecture: String,
    pub maintainer: String,
    pub description: String,

    // Optional fields
    pub depends: Vec<String>,
    pub pre_depends: Vec<String>,
    pub conflicts: Vec<String>,
    pub breaks: Vec<String>,
    pub replaces: Vec<String>,
    pub section: String,
    pub priority: String,
    pub homepage: String,
}

impl Control {
    fn effective_priority(&self) -> &str {
        if self.priority.is_empty() {
            "optional"
        } else {
            &self.priority
        }
    }

    /// Derive the standard Debian filename `{package}-{version}-{architecture}.deb`
    pub fn deb_filename(&self) -> String {
        format!("{}-{}-{}.deb", self.package, self.version, self.architecture)
    }

    /// Check field syntax against the Debian package format
    ///
    /// Every violation found is collected into a single
    /// [`Error::Validation`] so the caller can fix their spec in one
    /// pass. A build must not proceed past a validation failure.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        let required = [
            ("package", &self.package),
            ("version", &self.version),
            ("architecture", &self.architecture),
            ("maintainer", &self.maintainer),
            ("description", &self.description),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            issues.push(format!("missing required fields: {}", missing.join(", ")));
        }

        if !self.architecture.is_empty()
            && !SUPPORTED_ARCHITECTURES.contains(&self.architecture.as_str())
        {
            issues.push(format!(
                "architecture {:?} is not supported; expected one of {}",
                self.architecture,
                SUPPORTED_ARCHITECTURES.join(", ")
            ));
        }

        for dep in &self.depends {
            if !DEPENDS_RE.is_match(dep) {
                issues.push(format!(
                    "dependency {dep:?} is invalid; expected something like \"libc (= 5.1.2)\""
                ));
            }
        }
        for dep in &self.pre_depends {
            if !DEPENDS_RE.is_match(dep) {
                issues.push(format!(
                    "pre-dependency {dep:?} is invalid; expected something like \"libc (= 5.1.2)\""
                ));
            }
        }
        for relation in &self.replaces {
            if !RELATION_RE.is_match(relation) {
                issues.push(format!(
                    "replacement {relation:?} is invalid; expected something like \"libc (<< 5.1.2)\""
                ));
            }
        }
        for relation in &self.conflicts {
            if !RELATION_RE.is_match(relation) {
                issues.push(format!(
                    "conflict {relation:?} is invalid; expected something like \"libc (<< 5.1.2)\""
                ));
            }
        }
        for relation in &self.breaks {
            if !RELATION_RE.is_match(relation) {
                issues.push(format!(
                    "break {relation:?} is invalid; expected something like \"libc (<< 5.1.2)\""
                ));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { issues })
        }
    }

    /// Render the canonical control-file text
    ///
    /// Field order is fixed; list fields are comma-space joined in
    /// input order; empty optional fields are omitted entirely.
    /// `Description` is always the last line.
    pub fn render(&self, installed_size_kb: u64) -> String {
        let mut out = String::new();
        out.push_str(&format!("Package: {}\n", self.package));
        out.push_str(&format!("Version: {}\n", self.version));
        out.push_str(&format!("Architecture: {}\n", self.architecture));
        out.push_str(&format!("Maintainer: {}\n", self.maintainer));
        out.push_str(&format!("Installed-Size: {installed_size_kb}\n"));

        push_list(&mut out, "Pre-Depends", &self.pre_depends);
        push_list(&mut out, "Depends", &self.depends);
        push_list(&mut out, "Conflicts", &self.conflicts);
        push_list(&mut out, "Breaks", &self.breaks);
        push_list(&mut out, "Replaces", &self.replaces);

        if !self.section.is_empty() {
            out.push_str(&format!("Section: {}\n", self.section));
        }
        out.push_str(&format!("Priority: {}\n", self.effective_priority()));
        if !self.homepage.is_empty() {
            out.push_str(&format!("Homepage: {}\n", self.homepage));
        }
        out.push_str(&format!("Description: {}\n", self.description));
        out
    }
}

fn push_list(out: &mut String, key: &str, values: &[String]) {
    if !values.is_empty() {
        out.push_str(&format!("{key}: {}\n", values.join(", ")));
    }
}
