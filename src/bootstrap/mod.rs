// src/bootstrap/mod.rs

//! Staged toolchain bootstrap
//!
//! The bootstrap produces a self-hosting toolchain in four strictly ordered
//! stages, each consuming the capability record of the one before it:
//!
//! ```text
//! Seed (prebuilt archive, local archive, or from-source cross toolchain)
//!      │
//!      ▼ (cross-compiles, default or bootstrap-escape context)
//! ┌─────────────────────────────────────────────┐
//! │  Stage 1: cross toolchain                    │
//! │  linux-headers, binutils, gcc x2, glibc      │
//! └─────────────────────────────────────────────┘
//!      │
//!      ▼ (stage2-hermetic)
//! ┌─────────────────────────────────────────────┐
//! │  Stage 2: native gcc + aggregated host tools │
//! └─────────────────────────────────────────────┘
//!      │
//!      ▼ (stage3-hermetic)
//! ┌─────────────────────────────────────────────┐
//! │  Stage 3: every package rebuilt hermetically │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Ordering is carried by data dependencies in the generated graph
//! ([`BootstrapPlan`]); [`StageManager`] tracks which stages have
//! complete outputs during one invocation.

mod config;
mod plan;
mod seed;
mod stages;

pub use config::{
    BootstrapConfig, SourceSpec, TargetArch, DEFAULT_VENDOR, ENV_SEED_CHECKSUM, ENV_SEED_PATH,
    ENV_SEED_URL, ENV_TARGET_ARCH,
};
pub use plan::{
    package_target, source_target, stage1_target, BootstrapPlan, ENTRY, HOST_TOOLCHAIN,
    HOST_TOOLS, STAGE1_PACKAGES, STAGE1_ROOT, STAGE1_STAGE, STAGE1_TOOLCHAIN, STAGE2_GCC,
    STAGE2_ROOT, STAGE2_STAGE, STAGE2_TOOLCHAIN, STAGE3_IMAGE, TOOLCHAIN_SELECT,
};
pub use seed::{
    contents_sha256, file_sha256, pack_archive, read_metadata, seed_host_bin_dir, tree_sha256,
    unpack_archive, Compression, SeedConfig, SeedMetadata, SeedSource, METADATA_FILE,
    METADATA_FORMAT_VERSION, SEED_FETCH, SEED_FROM_SOURCE, SEED_LOCAL, SEED_TOOLCHAIN,
};
pub use stages::{BootstrapStage, StageManager, StageState};
