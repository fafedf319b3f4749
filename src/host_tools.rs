// src/host_tools.rs

//! Host tools aggregation
//!
//! Stage 2 packages each install into their own prefix. Later stages want
//! a single flat tool directory, so the prefixes are merged in input order
//! into one tree. When two prefixes provide the same path the first one
//! wins; [`ConflictPolicy::Strict`] turns collisions in executable
//! directories into errors instead. An earlier entry that is a dangling
//! symlink does not count: it would be pruned after the merge, so the
//! later entry takes its place.
//!
//! The merged tree is built in a sibling temporary directory and renamed
//! into place, so an interrupted merge never leaves a half-populated
//! output behind.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Subdirectories taken from each prefix
pub const MERGED_DIRS: &[&str] = &["bin", "sbin", "share", "lib", "lib64", "libexec"];

/// Subdirectories whose collisions count as conflicts
const EXEC_DIRS: &[&str] = &["bin", "sbin", "libexec"];

/// What to do when two prefixes provide the same executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the entry from the earliest prefix and warn
    #[default]
    FirstWins,
    /// Fail the merge
    Strict,
}

impl ConflictPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Self::Strict
        } else {
            Self::FirstWins
        }
    }
}

/// A path provided by more than one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Path relative to the merged directory
    pub path: PathBuf,
    pub kept_from: PathBuf,
    pub skipped_from: PathBuf,
}

/// Summary of a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub files: usize,
    pub symlinks: usize,
    pub conflicts: Vec<Conflict>,
    pub broken_symlinks_removed: usize,
}

/// Merge package install prefixes into one host tools directory
///
/// Each prefix contributes `<prefix>/usr/<dir>` when `<prefix>/usr`
/// exists, otherwise `<prefix>/<dir>`, for every dir in [`MERGED_DIRS`].
/// The output always has a `bin` directory.
pub fn merge_host_tools(
    prefixes: &[PathBuf],
    output: &Path,
    policy: ConflictPolicy,
) -> Result<MergeReport> {
    let staging = staging_dir(output, ".kindling-host-tools-")?;
    info!(
        "Merging {} prefixes into {}",
        prefixes.len(),
        output.display()
    );

    let mut report = MergeReport::default();
    let mut origins: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

    for prefix in prefixes {
        let usr = prefix.join("usr");
        let root = if usr.is_dir() { usr } else { prefix.clone() };
        for &sub in MERGED_DIRS {
            let src = root.join(sub);
            if !src.is_dir() {
                continue;
            }
            let mut merge = FirstWinsMerge {
                prefix,
                root: &root,
                sub,
                policy,
                origins: &mut origins,
                report: &mut report,
            };
            merge.run(&src, &staging.path().join(sub))?;
        }
    }

    fs::create_dir_all(staging.path().join("bin"))?;
    report.broken_symlinks_removed = remove_broken_symlinks(staging.path())?;
    commit(staging, output)?;

    info!(
        "Merged {} files, {} symlinks ({} conflicts, {} broken links removed)",
        report.files,
        report.symlinks,
        report.conflicts.len(),
        report.broken_symlinks_removed
    );
    Ok(report)
}

/// Layer sysroot trees: `base` first, then each overlay, last one wins
pub fn merge_sysroot(base: &Path, overlays: &[PathBuf], output: &Path) -> Result<MergeReport> {
    let staging = staging_dir(output, ".kindling-sysroot-")?;
    let mut report = MergeReport::default();

    for layer in std::iter::once(base).chain(overlays.iter().map(PathBuf::as_path)) {
        debug!("Layering {}", layer.display());
        for entry in WalkDir::new(layer).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let rel = relative(entry.path(), layer)?;
            let dest = staging.path().join(&rel);
            let ft = entry.file_type();

            if ft.is_dir() {
                if dest.symlink_metadata().is_ok_and(|m| !m.is_dir()) {
                    fs::remove_file(&dest)?;
                }
                fs::create_dir_all(&dest)?;
                continue;
            }

            match dest.symlink_metadata() {
                Ok(m) if m.is_dir() => fs::remove_dir_all(&dest)?,
                Ok(_) => fs::remove_file(&dest)?,
                Err(_) => {}
            }
            copy_entry(entry.path(), ft.is_symlink(), &dest, layer, &rel, &mut report)?;
        }
    }

    commit(staging, output)?;
    Ok(report)
}

struct FirstWinsMerge<'a> {
    prefix: &'a Path,
    /// `<prefix>/usr` or `<prefix>`
    root: &'a Path,
    sub: &'a str,
    policy: ConflictPolicy,
    origins: &'a mut BTreeMap<PathBuf, PathBuf>,
    report: &'a mut MergeReport,
}

impl FirstWinsMerge<'_> {
    fn run(&mut self, src: &Path, dst: &Path) -> Result<()> {
        fs::create_dir_all(dst)?;
        let mut walker = WalkDir::new(src).min_depth(1).sort_by_file_name().into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry?;
            let rel = relative(entry.path(), src)?;
            let dest = dst.join(&rel);
            let key = Path::new(self.sub).join(&rel);
            let ft = entry.file_type();

            let mut existing = dest.symlink_metadata().ok();
            if existing.as_ref().is_some_and(|m| m.file_type().is_symlink())
                && fs::metadata(&dest).is_err()
            {
                debug!("Replacing dangling {} from {}", key.display(), self.prefix.display());
                fs::remove_file(&dest)?;
                self.origins.remove(&key);
                existing = None;
            }
            if ft.is_dir() {
                match existing {
                    Some(m) if !m.is_dir() => {
                        self.conflict(key)?;
                        walker.skip_current_dir();
                    }
                    _ => fs::create_dir_all(&dest)?,
                }
                continue;
            }
            if existing.is_some() {
                self.conflict(key)?;
                continue;
            }

            copy_entry(entry.path(), ft.is_symlink(), &dest, self.root, &key, self.report)?;
            self.origins.insert(key, self.prefix.to_path_buf());
        }
        Ok(())
    }

    fn conflict(&mut self, key: PathBuf) -> Result<()> {
        let kept_from = self
            .origins
            .get(&key)
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<earlier prefix>"));

        if !EXEC_DIRS.contains(&self.sub) {
            debug!("Keeping first {} from {}", key.display(), kept_from.display());
            return Ok(());
        }

        if self.policy == ConflictPolicy::Strict {
            return Err(Error::AggregationConflict {
                name: key.display().to_string(),
                first: kept_from,
                second: self.prefix.to_path_buf(),
            });
        }

        warn!(
            "{} provided by both {} and {}, keeping the first",
            key.display(),
            kept_from.display(),
            self.prefix.display()
        );
        self.report.conflicts.push(Conflict {
            path: key,
            kept_from,
            skipped_from: self.prefix.to_path_buf(),
        });
        Ok(())
    }
}

fn staging_dir(output: &Path, prefix: &str) -> Result<TempDir> {
    if output.symlink_metadata().is_ok() {
        return Err(Error::OutputExists(output.to_path_buf()));
    }
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    Ok(tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?)
}

fn commit(staging: TempDir, output: &Path) -> Result<()> {
    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, output) {
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }
    Ok(())
}

fn relative(path: &Path, root: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| Error::Archive(format!("{} escapes {}", path.display(), root.display())))
}

/// Copy one file or symlink to `dest`
///
/// `rel` is the entry's path below `src_root`. Absolute symlinks pointing
/// inside `src_root` are rewritten relative to the link so they keep
/// resolving after the move.
fn copy_entry(
    path: &Path,
    is_symlink: bool,
    dest: &Path,
    src_root: &Path,
    rel: &Path,
    report: &mut MergeReport,
) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if is_symlink {
        let target = fs::read_link(path)?;
        let target = match target.strip_prefix(src_root) {
            Ok(inner) if target.is_absolute() => relativize(inner, rel),
            _ => target,
        };
        std::os::unix::fs::symlink(&target, dest)?;
        report.symlinks += 1;
    } else {
        fs::copy(path, dest)?;
        report.files += 1;
    }
    Ok(())
}

/// Path from the directory containing `link` to `target`, both relative
/// to the same root
fn relativize(target: &Path, link: &Path) -> PathBuf {
    fn normal(p: &Path) -> Vec<Component<'_>> {
        p.components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect()
    }
    let from = link.parent().map(normal).unwrap_or_default();
    let to = normal(target);
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for c in &to[common..] {
        out.push(c.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

fn remove_broken_symlinks(root: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        if entry.path_is_symlink() && fs::metadata(entry.path()).is_err() {
            debug!("Removing broken symlink {}", entry.path().display());
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
