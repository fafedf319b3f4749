// src/audit.rs

//! ELF audit of produced binaries
//!
//! A post-build gate over a directory (or single file) of outputs. Every
//! ELF object is checked for:
//!
//! - machine type matching the target architecture
//! - `GLIBC_x.y` symbol version requirements at or below a ceiling
//! - RPATH/RUNPATH entries that point into build trees or host library
//!   directories
//! - NEEDED sonames that are neither sysroot libraries nor provided by
//!   the scanned tree itself
//!
//! Compare mode checks that two trees contain the same ELF objects with
//! the same NEEDED sets.
//!
//! [`audit_seed`] checks an unpacked seed archive for leaks of the machine
//! that built it: incomplete metadata, dangling links, RPATHs into build
//! trees or host library directories, and host tools that were not linked
//! against the seed's own C library.

use crate::bootstrap::{contents_sha256, tree_sha256, TargetArch, METADATA_FILE};
use crate::error::{Error, Result};
use crate::toolchain::SEED_HOST_TOOLS_DIR;
use goblin::elf::header::{EM_AARCH64, EM_RISCV, EM_X86_64};
use goblin::elf::Elf;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Libraries provided by the base sysroot (glibc, gcc runtime, loader)
pub const SYSROOT_SONAMES: &[&str] = &[
    "libc.so.6",
    "libm.so.6",
    "libdl.so.2",
    "libpthread.so.0",
    "librt.so.1",
    "libutil.so.1",
    "libresolv.so.2",
    "libnss_dns.so.2",
    "libnss_files.so.2",
    "libcrypt.so.1",
    "libcrypt.so.2",
    "libmvec.so.1",
    "libnsl.so.1",
    "ld-linux-x86-64.so.2",
    "ld-linux-aarch64.so.1",
    "ld-linux-riscv64-lp64d.so.1",
    "libstdc++.so.6",
    "libgcc_s.so.1",
    "libatomic.so.1",
    "libgomp.so.1",
    "libquadmath.so.0",
    "libasan.so",
    "libtsan.so",
    "libubsan.so",
    "linux-vdso.so.1",
];

/// RPATH fragments that leak a build tree
const BUILD_TREE_PATTERNS: &[&str] = &["buck-out", ".cache/buck", "kindling-out"];

/// RPATH prefixes that point at the host's own libraries
const HOST_LIB_PREFIXES: &[&str] = &["/home/", "/usr/lib", "/lib/x86_64-linux-gnu", "/lib64"];

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Keys every seed `metadata.json` must carry
pub const SEED_METADATA_KEYS: &[&str] = &[
    "format_version",
    "target_triple",
    "gcc_version",
    "glibc_version",
    "contents_sha256",
];

/// Build trees that must not appear anywhere in a seed
const SEED_LEAK_PATTERNS: &[&str] = &["buck-out", ".cache/buck", "kindling-out"];

/// Host library directories seed host tools must not search
const SEED_HOST_LIB_PATTERNS: &[&str] = &["/usr/lib", "/usr/lib64", "/lib/x86_64-linux-gnu"];

/// Libraries that mark a dynamically linked host tool as seed-linked
const SEED_BASE_LIBS: &[&str] = &["libc.so", "libm.so", "libdl.so", "libpthread.so", "libstdc++.so"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One audit observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub path: PathBuf,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "WARN",
            Severity::Error => "ERROR",
        };
        write!(f, "{}: {}: {}", tag, self.path.display(), self.message)
    }
}

/// Result of auditing a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub files: usize,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn errors(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.errors() > 0
    }

    fn error(&mut self, path: &Path, message: String) {
        self.findings.push(Finding {
            path: path.to_path_buf(),
            severity: Severity::Error,
            message,
        });
    }

    fn warn(&mut self, path: &Path, message: String) {
        self.findings.push(Finding {
            path: path.to_path_buf(),
            severity: Severity::Warning,
            message,
        });
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        let verdict = if self.has_errors() { "FAIL" } else { "PASS" };
        write!(
            f,
            "{}: {} ELF files, {} errors, {} warnings",
            verdict,
            self.files,
            self.errors(),
            self.findings.len() - self.errors()
        )
    }
}

/// What an audit checks against
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub arch: TargetArch,
    /// Highest acceptable `GLIBC_x.y` requirement
    pub glibc_ceiling: Option<Vec<u32>>,
    /// Sonames accepted in addition to [`SYSROOT_SONAMES`]
    pub allowed_sonames: BTreeSet<String>,
}

impl AuditConfig {
    pub fn new(arch: TargetArch) -> Self {
        Self {
            arch,
            glibc_ceiling: None,
            allowed_sonames: BTreeSet::new(),
        }
    }

    /// Set the ceiling from a version string such as `2.42`
    pub fn with_glibc_ceiling(mut self, version: &str) -> Self {
        self.glibc_ceiling = parse_version(version);
        self
    }

    pub fn allow_soname(mut self, soname: impl Into<String>) -> Self {
        self.allowed_sonames.insert(soname.into());
        self
    }
}

/// ELF machine number for an architecture
pub fn elf_machine(arch: TargetArch) -> u16 {
    match arch {
        TargetArch::X86_64 => EM_X86_64,
        TargetArch::Aarch64 => EM_AARCH64,
        TargetArch::Riscv64 => EM_RISCV,
    }
}

fn parse_version(v: &str) -> Option<Vec<u32>> {
    v.split('.').map(|p| p.parse().ok()).collect()
}

/// Version from a `GLIBC_2.34` requirement name
fn glibc_requirement(name: &str) -> Option<Vec<u32>> {
    name.strip_prefix("GLIBC_").and_then(parse_version)
}

fn is_sysroot_soname(soname: &str) -> bool {
    if SYSROOT_SONAMES.contains(&soname) {
        return true;
    }
    // libasan.so.8 is covered by libasan.so
    soname
        .find(".so")
        .map(|i| &soname[..i + 3])
        .is_some_and(|base| SYSROOT_SONAMES.contains(&base))
}

/// Reason an RPATH/RUNPATH entry is rejected, if it is
fn forbidden_rpath(entry: &str) -> Option<&'static str> {
    BUILD_TREE_PATTERNS
        .iter()
        .find(|p| entry.contains(**p))
        .or_else(|| HOST_LIB_PREFIXES.iter().find(|p| entry.starts_with(**p)))
        .copied()
}

fn is_elf(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok()
        && &magic == ELF_MAGIC
}

/// Every regular ELF file under `root` (or `root` itself), sorted
pub fn find_elf_files(root: &Path) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(if is_elf(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        });
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_elf(entry.path()) {
            found.push(entry.path().to_path_buf());
        }
    }
    Ok(found)
}

/// Shared library names present anywhere in the tree
fn provided_sonames(root: &Path) -> Result<BTreeSet<String>> {
    let mut provided = BTreeSet::new();
    if !root.is_dir() {
        return Ok(provided);
    }
    for entry in WalkDir::new(root) {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if name.contains(".so") && !entry.file_type().is_dir() {
            provided.insert(name.into_owned());
        }
    }
    Ok(provided)
}

fn parse_elf<'a>(path: &Path, bytes: &'a [u8]) -> Result<Elf<'a>> {
    Elf::parse(bytes).map_err(|e| Error::Elf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Audit every ELF object under `root`
pub fn audit_path(root: &Path, config: &AuditConfig) -> Result<AuditReport> {
    let files = find_elf_files(root)?;
    let provided = provided_sonames(root)?;
    let machine = elf_machine(config.arch);
    info!("Auditing {} ELF files under {}", files.len(), root.display());

    let mut report = AuditReport {
        files: files.len(),
        ..Default::default()
    };

    for path in &files {
        let bytes = fs::read(path)?;
        let elf = match parse_elf(path, &bytes) {
            Ok(elf) => elf,
            Err(e) => {
                report.warn(path, e.to_string());
                continue;
            }
        };
        debug!("{}: {} NEEDED", path.display(), elf.libraries.len());

        if elf.header.e_machine != machine {
            report.error(
                path,
                format!(
                    "machine {} does not match {} ({})",
                    elf.header.e_machine, config.arch, machine
                ),
            );
        }

        if let (Some(ceiling), Some(verneed)) = (&config.glibc_ceiling, &elf.verneed) {
            let mut over = BTreeSet::new();
            for need in verneed.iter() {
                for aux in need.iter() {
                    let Some(name) = elf.dynstrtab.get_at(aux.vna_name) else {
                        continue;
                    };
                    if glibc_requirement(name).is_some_and(|v| v > *ceiling) {
                        over.insert(name.to_string());
                    }
                }
            }
            for name in over {
                report.error(path, format!("requires {} above ceiling", name));
            }
        }

        for entry in rpath_entries(&elf) {
            if let Some(pattern) = forbidden_rpath(entry) {
                report.error(path, format!("RPATH/RUNPATH entry {} matches {}", entry, pattern));
            }
        }

        for soname in &elf.libraries {
            if is_sysroot_soname(soname)
                || provided.contains(*soname)
                || config.allowed_sonames.contains(*soname)
            {
                continue;
            }
            report.error(path, format!("unresolved NEEDED {}", soname));
        }
    }
    Ok(report)
}

fn needed_by_relative_path(root: &Path) -> Result<BTreeMap<PathBuf, BTreeSet<String>>> {
    let mut map = BTreeMap::new();
    for path in find_elf_files(root)? {
        let bytes = fs::read(&path)?;
        let needed = match parse_elf(&path, &bytes) {
            Ok(elf) => elf.libraries.iter().map(|s| s.to_string()).collect(),
            Err(_) => BTreeSet::new(),
        };
        let rel = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        map.insert(rel, needed);
    }
    Ok(map)
}

/// Check that two trees hold the same ELF objects with the same NEEDED sets
pub fn compare(left: &Path, right: &Path) -> Result<AuditReport> {
    let a = needed_by_relative_path(left)?;
    let b = needed_by_relative_path(right)?;
    let mut report = AuditReport {
        files: a.len().max(b.len()),
        ..Default::default()
    };

    for (rel, needed) in &a {
        match b.get(rel) {
            None => report.error(rel, format!("only in {}", left.display())),
            Some(other) if other != needed => {
                let only_left: Vec<_> = needed.difference(other).cloned().collect();
                let only_right: Vec<_> = other.difference(needed).cloned().collect();
                report.error(
                    rel,
                    format!(
                        "NEEDED differs: -[{}] +[{}]",
                        only_left.join(", "),
                        only_right.join(", ")
                    ),
                );
            }
            Some(_) => {}
        }
    }
    for rel in b.keys().filter(|k| !a.contains_key(*k)) {
        report.error(rel, format!("only in {}", right.display()));
    }
    Ok(report)
}

fn contains_bytes(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|w| w == needle.as_bytes())
}

fn rpath_entries<'a>(elf: &'a Elf<'_>) -> impl Iterator<Item = &'a str> {
    elf.rpaths
        .iter()
        .chain(elf.runpaths.iter())
        .flat_map(|r| r.split(':'))
}

/// Which part of a seed an ELF object lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedArea {
    Tools,
    Sysroot,
    HostTools,
}

impl SeedArea {
    fn name(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Sysroot => "sysroot",
            Self::HostTools => "host-tools",
        }
    }

    fn forbidden(self, entry: &str) -> Option<&'static str> {
        let extra: &[&'static str] = match self {
            Self::Tools => &[],
            Self::Sysroot => &["/home/"],
            Self::HostTools => SEED_HOST_LIB_PATTERNS,
        };
        SEED_LEAK_PATTERNS
            .iter()
            .chain(extra)
            .find(|p| entry.contains(**p))
            .copied()
    }
}

/// Audit an unpacked seed archive rooted at `root`
pub fn audit_seed(root: &Path) -> Result<AuditReport> {
    let mut report = AuditReport::default();
    let meta = seed_metadata(root, &mut report);
    let rel = |path: &Path| path.strip_prefix(root).unwrap_or(path).to_path_buf();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.path_is_symlink() && fs::metadata(entry.path()).is_err() {
            let target = fs::read_link(entry.path())?;
            report.warn(
                &rel(entry.path()),
                format!("broken symlink -> {}", target.display()),
            );
        }
    }

    let tools = root.join("tools");
    let triple = meta
        .as_ref()
        .and_then(|m| m.get("target_triple"))
        .and_then(|t| t.as_str());
    if tools.is_dir() {
        scan_seed_area(root, &tools, SeedArea::Tools, &mut report)?;
        match triple.map(|t| tools.join(t).join("sys-root")) {
            Some(sysroot) if sysroot.is_dir() => {
                scan_seed_area(root, &sysroot, SeedArea::Sysroot, &mut report)?;
            }
            _ => report.warn(Path::new("tools"), "sysroot directory not found".to_string()),
        }
    } else {
        report.error(Path::new("tools"), "directory not found".to_string());
    }

    let host_tools = root.join(SEED_HOST_TOOLS_DIR);
    let declared = meta
        .as_ref()
        .and_then(|m| m.get("has_host_tools"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if host_tools.is_dir() {
        scan_seed_area(root, &host_tools, SeedArea::HostTools, &mut report)?;
        if let Some(expected) = meta
            .as_ref()
            .and_then(|m| m.get("host_tools_sha256"))
            .and_then(|v| v.as_str())
        {
            let actual = tree_sha256(&host_tools)?;
            if actual != expected {
                report.error(
                    Path::new(SEED_HOST_TOOLS_DIR),
                    format!("contents hash {} does not match metadata {}", actual, expected),
                );
            }
        }
    } else if declared {
        report.error(
            Path::new(SEED_HOST_TOOLS_DIR),
            "not found but metadata says has_host_tools".to_string(),
        );
    }

    if let Some(expected) = meta
        .as_ref()
        .and_then(|m| m.get("contents_sha256"))
        .and_then(|v| v.as_str())
    {
        let actual = contents_sha256(root)?;
        if actual != expected {
            report.error(
                Path::new(METADATA_FILE),
                format!("contents hash {} does not match {}", actual, expected),
            );
        }
    }

    info!(
        "Seed audit of {}: {} ELF files, {} findings",
        root.display(),
        report.files,
        report.findings.len()
    );
    Ok(report)
}

/// Parsed `metadata.json`, with missing keys recorded as errors
fn seed_metadata(root: &Path, report: &mut AuditReport) -> Option<serde_json::Value> {
    let path = root.join(METADATA_FILE);
    let name = Path::new(METADATA_FILE);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => {
            report.error(name, "not found".to_string());
            return None;
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(e) => {
            report.error(name, format!("invalid JSON: {}", e));
            return None;
        }
    };
    for key in SEED_METADATA_KEYS {
        if value.get(key).is_none() {
            report.error(name, format!("missing key {}", key));
        }
    }
    Some(value)
}

fn scan_seed_area(
    root: &Path,
    dir: &Path,
    area: SeedArea,
    report: &mut AuditReport,
) -> Result<()> {
    let files = find_elf_files(dir)?;
    debug!("{}: {} ELF files", area.name(), files.len());
    report.files += files.len();

    for path in &files {
        let rel = path.strip_prefix(root).unwrap_or(path);
        let in_bin = path
            .strip_prefix(dir)
            .map(|p| p.parent().is_some_and(|d| d.ends_with("bin")))
            .unwrap_or(false);
        let bytes = fs::read(path)?;

        if in_bin && area != SeedArea::Sysroot {
            if let Some(pattern) = SEED_LEAK_PATTERNS.iter().find(|p| contains_bytes(&bytes, p)) {
                report.warn(rel, format!("{} binary embeds {}", area.name(), pattern));
            }
        }

        let elf = match parse_elf(path, &bytes) {
            Ok(elf) => elf,
            Err(e) => {
                report.warn(rel, e.to_string());
                continue;
            }
        };

        for entry in rpath_entries(&elf) {
            if let Some(pattern) = area.forbidden(entry) {
                report.error(
                    rel,
                    format!("{} RPATH/RUNPATH entry {} matches {}", area.name(), entry, pattern),
                );
            }
        }

        if area == SeedArea::HostTools
            && in_bin
            && !elf.libraries.is_empty()
            && !elf
                .libraries
                .iter()
                .any(|lib| SEED_BASE_LIBS.iter().any(|base| lib.contains(base)))
        {
            report.warn(rel, "host tool links no seed C library".to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn foreign_arch() -> TargetArch {
        if cfg!(target_arch = "x86_64") {
            TargetArch::Aarch64
        } else {
            TargetArch::X86_64
        }
    }

    #[test]
    fn test_glibc_requirement_parsing() {
        assert_eq!(glibc_requirement("GLIBC_2.34"), Some(vec![2, 34]));
        assert_eq!(glibc_requirement("GLIBC_2.2.5"), Some(vec![2, 2, 5]));
        assert_eq!(glibc_requirement("GLIBC_PRIVATE"), None);
        assert_eq!(glibc_requirement("GCC_3.0"), None);
        assert!(vec![2, 43] > vec![2, 42]);
        assert!(vec![2, 2, 5] < vec![2, 42]);
    }

    #[test]
    fn test_sysroot_sonames() {
        assert!(is_sysroot_soname("libc.so.6"));
        assert!(is_sysroot_soname("libasan.so.8"));
        assert!(!is_sysroot_soname("libz.so.1"));
        assert!(!is_sysroot_soname("libcrypto.so.3"));
    }

    #[test]
    fn test_forbidden_rpaths() {
        assert_eq!(forbidden_rpath("/home/builder/src/lib"), Some("/home/"));
        assert_eq!(forbidden_rpath("/usr/lib64"), Some("/usr/lib"));
        assert_eq!(forbidden_rpath("/work/buck-out/v2/gen/lib"), Some("buck-out"));
        assert_eq!(forbidden_rpath("$ORIGIN/../lib"), None);
        assert_eq!(forbidden_rpath("/opt/kindling/usr/lib"), None);
    }

    #[test]
    fn test_non_elf_files_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("script.sh"), b"#!/bin/sh\n").unwrap();
        fs::write(temp.path().join("tiny"), b"\x7f").unwrap();
        assert!(find_elf_files(temp.path()).unwrap().is_empty());

        let report = audit_path(temp.path(), &AuditConfig::new(TargetArch::X86_64)).unwrap();
        assert_eq!(report.files, 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn test_machine_mismatch_is_error() {
        let exe = std::env::current_exe().unwrap();
        let config = AuditConfig::new(foreign_arch()).with_glibc_ceiling("999.0");
        let report = audit_path(&exe, &config).unwrap();
        assert_eq!(report.files, 1);
        assert!(report.has_errors());
        assert!(report.findings.iter().any(|f| f.message.starts_with("machine ")));
        assert!(report.to_string().contains("FAIL: 1 ELF files"));
    }

    const SEED_TRIPLE: &str = "x86_64-kindling-linux-gnu";

    fn seed_tree(root: &Path, host_tools: bool) {
        fs::create_dir_all(root.join("tools/bin")).unwrap();
        fs::create_dir_all(root.join(format!("tools/{}/sys-root/usr/lib", SEED_TRIPLE))).unwrap();
        fs::write(root.join("tools/bin/README"), b"cross tools\n").unwrap();
        if host_tools {
            fs::create_dir_all(root.join("host-tools/bin")).unwrap();
            fs::write(root.join("host-tools/bin/m4"), b"#!/bin/sh\n").unwrap();
        }
    }

    fn write_seed_metadata(root: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut meta = serde_json::json!({
            "format_version": 1,
            "target_triple": SEED_TRIPLE,
            "gcc_version": "15.2.0",
            "glibc_version": "2.42",
            "contents_sha256": contents_sha256(root).unwrap(),
            "has_host_tools": root.join("host-tools").is_dir(),
        });
        edit(&mut meta);
        fs::write(root.join(METADATA_FILE), meta.to_string()).unwrap();
    }

    fn messages(report: &AuditReport, severity: Severity) -> Vec<String> {
        report
            .findings
            .iter()
            .filter(|f| f.severity == severity)
            .map(|f| f.message.clone())
            .collect()
    }

    #[test]
    fn test_seed_audit_clean_tree() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), true);
        write_seed_metadata(temp.path(), |_| {});
        let report = audit_seed(temp.path()).unwrap();
        assert!(report.findings.is_empty(), "{report}");
        assert!(report.to_string().starts_with("PASS"));
    }

    #[test]
    fn test_seed_audit_scans_real_binaries() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), true);
        let exe = std::env::current_exe().unwrap();
        fs::copy(&exe, temp.path().join("tools/bin/cc")).unwrap();
        fs::copy(&exe, temp.path().join("host-tools/bin/tool")).unwrap();
        write_seed_metadata(temp.path(), |_| {});

        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(report.files, 2);
        assert!(!report.has_errors(), "{report}");
    }

    #[test]
    fn test_seed_audit_missing_metadata_key() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        write_seed_metadata(temp.path(), |m| {
            m.as_object_mut().unwrap().remove("glibc_version");
        });
        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(messages(&report, Severity::Error), vec!["missing key glibc_version"]);
    }

    #[test]
    fn test_seed_audit_missing_metadata_file() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        let report = audit_seed(temp.path()).unwrap();
        assert!(report.has_errors());
        assert_eq!(report.findings[0].path, PathBuf::from(METADATA_FILE));
        // no triple to locate the sysroot with
        assert!(messages(&report, Severity::Warning).contains(&"sysroot directory not found".to_string()));
    }

    #[test]
    fn test_seed_audit_declared_host_tools_absent() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        write_seed_metadata(temp.path(), |m| m["has_host_tools"] = true.into());
        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(
            messages(&report, Severity::Error),
            vec!["not found but metadata says has_host_tools"]
        );
    }

    #[test]
    fn test_seed_audit_host_tools_hash_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), true);
        write_seed_metadata(temp.path(), |m| m["host_tools_sha256"] = "0".repeat(64).into());
        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(report.errors(), 1);
        assert_eq!(report.findings[0].path, PathBuf::from("host-tools"));
    }

    #[test]
    fn test_seed_audit_broken_symlink_is_warning() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        std::os::unix::fs::symlink("../libexec/cc1", temp.path().join("tools/bin/cc1")).unwrap();
        write_seed_metadata(temp.path(), |_| {});

        let report = audit_seed(temp.path()).unwrap();
        assert!(!report.has_errors(), "{report}");
        assert_eq!(
            messages(&report, Severity::Warning),
            vec!["broken symlink -> ../libexec/cc1"]
        );
        assert_eq!(report.findings[0].path, PathBuf::from("tools/bin/cc1"));
    }

    #[test]
    fn test_seed_audit_requires_tools_dir() {
        let temp = tempfile::tempdir().unwrap();
        write_seed_metadata(temp.path(), |_| {});
        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(messages(&report, Severity::Error), vec!["directory not found"]);
        assert_eq!(report.findings[0].path, PathBuf::from("tools"));
    }

    #[test]
    fn test_seed_audit_embedded_build_path_is_warning() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        let mut bytes = ELF_MAGIC.to_vec();
        bytes.extend_from_slice(b"\0\0/work/buck-out/v2/gen/ld\0");
        fs::write(temp.path().join("tools/bin/ld"), &bytes).unwrap();
        write_seed_metadata(temp.path(), |_| {});

        let report = audit_seed(temp.path()).unwrap();
        assert!(!report.has_errors(), "{report}");
        assert!(messages(&report, Severity::Warning)
            .contains(&"tools binary embeds buck-out".to_string()));
    }

    #[test]
    fn test_seed_audit_contents_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        seed_tree(temp.path(), false);
        write_seed_metadata(temp.path(), |_| {});
        fs::write(temp.path().join("tools/bin/README"), b"tampered\n").unwrap();
        let report = audit_seed(temp.path()).unwrap();
        assert_eq!(report.errors(), 1);
        assert_eq!(report.findings[0].path, PathBuf::from(METADATA_FILE));
    }

    #[test]
    fn test_seed_rpath_rules_per_area() {
        assert_eq!(SeedArea::Tools.forbidden("/home/ci/lib"), None);
        assert_eq!(SeedArea::Sysroot.forbidden("/home/ci/lib"), Some("/home/"));
        assert_eq!(SeedArea::Tools.forbidden("/x/buck-out/lib"), Some("buck-out"));
        assert_eq!(SeedArea::HostTools.forbidden("/usr/lib64"), Some("/usr/lib"));
        assert_eq!(SeedArea::Sysroot.forbidden("/usr/lib64"), None);
        assert_eq!(SeedArea::HostTools.forbidden("$ORIGIN/../lib"), None);
    }

    #[test]
    fn test_compare_detects_missing_objects() {
        let temp = tempfile::tempdir().unwrap();
        let left = temp.path().join("left");
        let right = temp.path().join("right");
        fs::create_dir_all(left.join("bin")).unwrap();
        fs::create_dir_all(&right).unwrap();
        fs::copy(std::env::current_exe().unwrap(), left.join("bin/tool")).unwrap();

        let report = compare(&left, &right).unwrap();
        assert_eq!(report.errors(), 1);
        assert_eq!(report.findings[0].path, PathBuf::from("bin/tool"));

        let same = compare(&left, &left).unwrap();
        assert!(!same.has_errors());
    }
}
