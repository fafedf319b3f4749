// src/commands/merge.rs

//! Host tools and sysroot merge commands

use super::load_config;
use anyhow::{Context, Result};
use kindling::host_tools::{merge_host_tools, merge_sysroot, ConflictPolicy, MergeReport};
use std::path::{Path, PathBuf};

fn print_report(report: &MergeReport) {
    println!("  Files:    {}", report.files);
    println!("  Symlinks: {}", report.symlinks);
    if report.broken_symlinks_removed > 0 {
        println!("  Removed {} broken symlinks", report.broken_symlinks_removed);
    }
    for conflict in &report.conflicts {
        println!(
            "  [CONFLICT] {}: kept {}, skipped {}",
            conflict.path.display(),
            conflict.kept_from.display(),
            conflict.skipped_from.display()
        );
    }
}

/// Merge host tool prefixes, first prefix wins unless strict
pub fn cmd_host_tools_merge(
    prefixes: &[String],
    output: &str,
    strict: bool,
    config: Option<&str>,
) -> Result<()> {
    let config = load_config(config)?;
    let policy = ConflictPolicy::from_strict(strict || config.strict_host_tools);
    let prefixes: Vec<PathBuf> = prefixes.iter().map(PathBuf::from).collect();
    println!("Merging {} prefixes into {} ({:?})", prefixes.len(), output, policy);

    let report = merge_host_tools(&prefixes, Path::new(output), policy)
        .context("Host tools merge failed")?;
    print_report(&report);
    println!("\n[OK] Host tools merged");
    Ok(())
}

/// Layer sysroot overlays over a base, later overlays win
pub fn cmd_sysroot_merge(base: &str, overlays: &[String], output: &str) -> Result<()> {
    let overlays: Vec<PathBuf> = overlays.iter().map(PathBuf::from).collect();
    println!("Layering {} overlays on {} into {}", overlays.len(), base, output);

    let report = merge_sysroot(Path::new(base), &overlays, Path::new(output))
        .context("Sysroot merge failed")?;
    print_report(&report);
    println!("\n[OK] Sysroot merged");
    Ok(())
}
