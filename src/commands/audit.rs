// src/commands/audit.rs

//! ELF audit command

use super::load_config;
use anyhow::{anyhow, Context, Result};
use kindling::audit::{self, AuditConfig};
use kindling::TargetArch;
use std::path::Path;

/// Audit a tree (or compare two); exits 1 on any error-level finding
pub fn cmd_audit(
    path: Option<&str>,
    config: Option<&str>,
    target: Option<&str>,
    glibc: Option<&str>,
    allow: &[String],
    compare: Option<&[String]>,
) -> Result<()> {
    let report = match (compare, path) {
        (Some([left, right]), _) => {
            println!("Comparing {} with {}", left, right);
            audit::compare(Path::new(left), Path::new(right))?
        }
        (Some(_), _) => return Err(anyhow!("--compare takes exactly two paths")),
        (None, Some(path)) => {
            let bootstrap = load_config(config)?;
            let arch = match target {
                Some(t) => TargetArch::parse(t)
                    .context("Invalid target architecture. Use: x86_64, aarch64, riscv64")?,
                None => bootstrap.target_arch,
            };
            let mut audit_config = AuditConfig::new(arch)
                .with_glibc_ceiling(glibc.unwrap_or(&bootstrap.glibc_version));
            for soname in allow {
                audit_config = audit_config.allow_soname(soname);
            }

            println!("Auditing {} for {}", path, arch);
            audit::audit_path(Path::new(path), &audit_config)
                .with_context(|| format!("Failed to audit {}", path))?
        }
        (None, None) => return Err(anyhow!("Nothing to audit")),
    };

    println!("{}", report);
    if report.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
