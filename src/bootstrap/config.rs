// src/bootstrap/config.rs

//! Bootstrap configuration types
//!
//! The configuration is read once, at configuration-selection time, from a
//! TOML file plus a small set of environment overrides. Nothing downstream
//! re-reads it; the plan generator captures every value it needs.

use super::seed::{SeedConfig, SeedSource};
use crate::error::{ConfigError, Error, Result};
use crate::label::DEFAULT_NAMESPACE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Vendor field of generated target triples
pub const DEFAULT_VENDOR: &str = "kindling";

/// Environment variable overriding the seed archive URL
pub const ENV_SEED_URL: &str = "KINDLING_SEED_URL";
/// Environment variable overriding the seed archive path
pub const ENV_SEED_PATH: &str = "KINDLING_SEED_PATH";
/// Environment variable overriding the seed checksum
pub const ENV_SEED_CHECKSUM: &str = "KINDLING_SEED_CHECKSUM";
/// Environment variable overriding the target architecture
pub const ENV_TARGET_ARCH: &str = "KINDLING_TARGET_ARCH";

/// Target architecture for bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetArch {
    /// x86_64 / AMD64
    #[default]
    X86_64,
    /// AArch64 / ARM64
    Aarch64,
    /// RISC-V 64-bit
    Riscv64,
}

impl TargetArch {
    /// Architecture component of the GNU triple
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::Riscv64 => "riscv64",
        }
    }

    /// GNU target triple for a vendor
    pub fn triple(&self, vendor: &str) -> String {
        format!("{}-{}-linux-gnu", self.as_str(), vendor)
    }

    /// Get the kernel architecture name
    pub fn kernel_arch(&self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "arm64",
            Self::Riscv64 => "riscv",
        }
    }

    /// Dynamic loader path inside a sysroot
    pub fn interpreter(&self) -> &'static str {
        match self {
            Self::X86_64 => "lib64/ld-linux-x86-64.so.2",
            Self::Aarch64 => "lib/ld-linux-aarch64.so.1",
            Self::Riscv64 => "lib/ld-linux-riscv64-lp64d.so.1",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "riscv64" => Some(Self::Riscv64),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Target architecture
    pub target_arch: TargetArch,

    /// Vendor component of the target triple
    pub vendor: String,

    /// Number of parallel jobs for building
    pub jobs: usize,

    /// Kernel version for headers
    pub kernel_version: String,

    /// GCC version
    pub gcc_version: String,

    /// glibc version (also the symbol-version ceiling for audits)
    pub glibc_version: String,

    /// binutils version
    pub binutils_version: String,

    /// Root under which every action output directory is placed
    pub output_root: PathBuf,

    /// Namespace of provenance labels
    pub label_namespace: String,

    /// Build stage 1 with ambient host tools instead of the seed
    pub use_host_toolchain: bool,

    /// Treat host tools name collisions as fatal
    pub strict_host_tools: bool,

    /// Packages aggregated into the stage 2 host tools directory
    pub host_tool_packages: Vec<String>,

    /// Packages rebuilt hermetically in stage 3 besides the host tools
    pub system_packages: Vec<String>,

    /// Seed toolchain source
    pub seed: SeedConfig,

    /// Upstream sources fetched by the external engine
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceSpec>,
}

/// One upstream source archive and its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Source name; packages named `<name>` or `<name>-*` consume it
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SourceSpec {
    /// Whether a package consumes this source
    pub fn feeds(&self, package: &str) -> bool {
        package == self.name
            || package
                .strip_prefix(self.name.as_str())
                .is_some_and(|rest| rest.starts_with('-'))
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            target_arch: TargetArch::X86_64,
            vendor: DEFAULT_VENDOR.to_string(),
            jobs: num_cpus(),
            kernel_version: "6.18".to_string(),
            gcc_version: "15.2.0".to_string(),
            glibc_version: "2.42".to_string(),
            binutils_version: "2.45.1".to_string(),
            output_root: PathBuf::from("kindling-out"),
            label_namespace: DEFAULT_NAMESPACE.to_string(),
            use_host_toolchain: false,
            strict_host_tools: false,
            host_tool_packages: [
                "make", "m4", "bison", "flex", "pkgconf", "perl", "python", "gawk", "sed",
                "texinfo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            system_packages: [
                "zlib",
                "xz",
                "zstd",
                "coreutils",
                "bash",
                "util-linux",
                "linux",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            seed: SeedConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl BootstrapConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse configuration from TOML
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading bootstrap config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key/value lookup
    ///
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_SEED_URL) {
            debug!("{} overrides seed url", ENV_SEED_URL);
            self.seed.url = Some(url);
        }
        if let Some(path) = get(ENV_SEED_PATH) {
            debug!("{} overrides seed path", ENV_SEED_PATH);
            self.seed.path = Some(PathBuf::from(path));
        }
        if let Some(checksum) = get(ENV_SEED_CHECKSUM) {
            self.seed.checksum = Some(checksum);
        }
        if let Some(arch) = get(ENV_TARGET_ARCH) {
            self.target_arch = TargetArch::parse(&arch).ok_or_else(|| {
                Error::config(
                    "<configuration>",
                    ENV_TARGET_ARCH,
                    ConfigError::InvalidValue {
                        transition: "<environment>".to_string(),
                        setting: "target_arch".to_string(),
                        value: arch.clone(),
                    },
                )
            })?;
        }
        Ok(self)
    }

    /// Set the target architecture
    pub fn with_target(mut self, arch: TargetArch) -> Self {
        self.target_arch = arch;
        self
    }

    /// Set number of parallel jobs
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Set the output root
    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Fetch the seed from a URL
    pub fn with_seed_url(mut self, url: impl Into<String>, checksum: impl Into<String>) -> Self {
        self.seed.url = Some(url.into());
        self.seed.checksum = Some(checksum.into());
        self
    }

    /// Use a locally supplied seed archive
    pub fn with_seed_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed.path = Some(path.into());
        self
    }

    /// Build stage 1 with ambient host tools
    pub fn with_host_toolchain(mut self, enabled: bool) -> Self {
        self.use_host_toolchain = enabled;
        self
    }

    /// Get the target triple
    pub fn triple(&self) -> String {
        self.target_arch.triple(&self.vendor)
    }

    /// Resolve the seed source by precedence
    pub fn seed_source(&self) -> Result<SeedSource> {
        SeedSource::select(&self.seed)
            .map_err(|e| Error::config("<seed>", self.triple(), e))
    }

    /// Label of the target producing the seed archive
    pub fn seed_archive_label(&self) -> Result<&'static str> {
        Ok(self.seed_source()?.archive_label())
    }
}

/// Get number of CPUs for parallel builds
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
