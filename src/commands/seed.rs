// src/commands/seed.rs

//! Seed archive commands

use super::load_config;
use anyhow::{Context, Result};
use kindling::audit;
use kindling::bootstrap::{
    file_sha256, pack_archive, read_metadata, seed_host_bin_dir, unpack_archive, SeedMetadata,
    METADATA_FORMAT_VERSION,
};
use std::path::Path;

fn print_metadata(metadata: &SeedMetadata) {
    println!("  Target:   {}", metadata.target_triple);
    println!("  GCC:      {}", metadata.gcc_version);
    println!("  glibc:    {}", metadata.glibc_version);
    println!("  Contents: {}", metadata.contents_sha256);
    if metadata.has_host_tools {
        match metadata.host_tools_sha256 {
            Some(ref sum) => println!("  Host tools: {}", sum),
            None => println!("  Host tools: yes"),
        }
    }
    if let Some(created) = metadata.created_at {
        println!("  Created:  {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
}

/// Show seed metadata and the archive checksum
pub fn cmd_seed_show(archive: &str) -> Result<()> {
    let path = Path::new(archive);
    let metadata =
        read_metadata(path).with_context(|| format!("Failed to read seed archive {}", archive))?;

    println!("Seed archive: {}", archive);
    println!("  Format:   v{}", metadata.format_version);
    print_metadata(&metadata);
    println!("  SHA-256:  {}", file_sha256(path)?);

    if metadata.format_version != METADATA_FORMAT_VERSION {
        println!(
            "\n[ERROR] Unsupported metadata format v{} (expected v{})",
            metadata.format_version, METADATA_FORMAT_VERSION
        );
    }
    Ok(())
}

/// Unpack a seed archive, verifying its contents hash unless told not to
pub fn cmd_seed_unpack(archive: &str, output: &str, no_verify: bool) -> Result<()> {
    println!("Unpacking {} -> {}", archive, output);
    let metadata = unpack_archive(Path::new(archive), Path::new(output), !no_verify)
        .with_context(|| format!("Failed to unpack {}", archive))?;

    print_metadata(&metadata);
    if let Some(bin) = seed_host_bin_dir(Path::new(output)) {
        println!("  Host bin: {}", bin.display());
    }
    if no_verify {
        println!("\n[OK] Unpacked (contents not verified)");
    } else {
        println!("\n[OK] Unpacked and verified");
    }
    Ok(())
}

/// Pack a toolchain directory into a seed archive
pub fn cmd_seed_pack(
    dir: &str,
    output: &str,
    config: Option<&str>,
    host_tools: Option<&str>,
) -> Result<()> {
    let config = load_config(config)?;
    let metadata = SeedMetadata {
        format_version: METADATA_FORMAT_VERSION,
        target_triple: config.triple(),
        gcc_version: config.gcc_version.clone(),
        glibc_version: config.glibc_version.clone(),
        contents_sha256: String::new(),
        created_at: Some(chrono::Utc::now()),
        has_host_tools: false,
        host_tools_sha256: None,
    };

    println!("Packing {} -> {}", dir, output);
    let metadata = pack_archive(
        Path::new(dir),
        Path::new(output),
        metadata,
        host_tools.map(Path::new),
    )
    .with_context(|| format!("Failed to pack {}", dir))?;

    print_metadata(&metadata);
    println!("  SHA-256:  {}", file_sha256(Path::new(output))?);
    println!("\n[OK] Seed archive written");
    Ok(())
}

/// Unpack into a scratch directory and audit the seed for leaks; exits 1 on
/// any error-level finding
pub fn cmd_seed_verify(archive: &str) -> Result<()> {
    let scratch = tempfile::Builder::new()
        .prefix("seed-verify-")
        .tempdir()
        .context("Failed to create scratch directory")?;
    let root = scratch.path().join("seed");

    println!("Verifying seed archive {}", archive);
    // the audit reports hash mismatches alongside everything else
    unpack_archive(Path::new(archive), &root, false)
        .with_context(|| format!("Failed to unpack {}", archive))?;

    let report = audit::audit_seed(&root)
        .with_context(|| format!("Failed to audit {}", archive))?;
    println!("{}", report);
    let failed = report.has_errors();
    drop(scratch);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}
