// src/lib.rs

//! Kindling: staged toolchain bootstrap and configuration transitions
//!
//! Kindling builds a self-hosting compiler toolchain in layered stages and
//! decides, for every node of a dependency graph, which toolchain variant
//! that node is built with.
//!
//! # Architecture
//!
//! - Contexts: immutable setting bindings; every node is evaluated in one
//! - Transitions: pure context rewrites attached to dependency edges
//! - Toolchains: one normalized capability record regardless of origin
//! - Bootstrap: seed, stage 1, stage 2, stage 3, ordered by data dependencies
//! - Verification: graph-level proofs of isolation, deduplication and
//!   hermeticity, plus an ELF audit of produced binaries

pub mod audit;
pub mod bootstrap;
pub mod context;
mod error;
pub mod graph;
pub mod host_tools;
pub mod label;
pub mod toolchain;
pub mod transition;
pub mod verify;

pub use audit::{AuditConfig, AuditReport, Finding, Severity};
pub use bootstrap::{BootstrapConfig, BootstrapPlan, BootstrapStage, StageManager, TargetArch};
pub use context::{Context, Settings, ToolchainMode};
pub use error::{ConfigError, Error, Result};
pub use graph::{BuildGraph, ConfiguredKey, EvaluatedGraph, Evaluator};
pub use host_tools::{merge_host_tools, merge_sysroot, ConflictPolicy, MergeReport};
pub use label::{LabelParseError, Provenance, ProvenanceLabel};
pub use toolchain::{BootstrapStageInfo, ToolchainInfo, ToolchainOrigin, ToolchainSource};
pub use transition::Transition;
pub use verify::{Assertion, Report, Verifier};
