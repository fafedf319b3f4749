// src/graph/mod.rs

//! Unconfigured build graph
//!
//! The graph is the declarative input the evaluator walks: a registry of
//! constraint settings, a set of named transitions, and targets keyed by
//! their unconfigured name (`//stage1:glibc`). Each target is a rule plus
//! typed dependency edges, optionally carrying a transition, and a list of
//! provenance label strings.
//!
//! A graph round-trips through TOML:
//!
//! ```toml
//! target_triple = "x86_64-kindling-linux-gnu"
//!
//! [settings.toolchain_mode]
//! values = ["host", "seed", "stage1", "stage2"]
//! default = "seed"
//!
//! [[transitions]]
//! name = "bootstrap-escape"
//! bindings = { toolchain_mode = "host" }
//!
//! [targets."//stage1:binutils"]
//! rule = { kind = "package" }
//! deps = [{ target = "//toolchain:select", role = "toolchain" }]
//! ```

mod evaluate;
mod evaluated;

pub use evaluate::{Evaluator, Providers};
pub use evaluated::{ConfiguredKey, EvaluatedGraph, EvaluatedNode};

use crate::context::Settings;
use crate::error::{ConfigError, Result};
use crate::transition::Transition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Role a dependency edge plays for its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepRole {
    /// Plain build input
    #[default]
    Default,
    /// Toolchain used to build the consumer
    Toolchain,
    /// Sysroot for a cross toolchain
    Sysroot,
    /// Bootstrap stage whose outputs the consumer wraps
    Stage,
    /// Aggregated host tools directory
    HostTools,
}

impl DepRole {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Toolchain => "toolchain",
            Self::Sysroot => "sysroot",
            Self::Stage => "stage",
            Self::HostTools => "host_tools",
        }
    }

    fn is_default(&self) -> bool {
        *self == Self::Default
    }
}

/// A dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dep {
    /// Unconfigured target name
    pub target: String,
    #[serde(default, skip_serializing_if = "DepRole::is_default")]
    pub role: DepRole,
    /// Transition applied to the consumer's context on this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
}

impl Dep {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            role: DepRole::Default,
            transition: None,
        }
    }

    pub fn with_role(mut self, role: DepRole) -> Self {
        self.role = role;
        self
    }

    pub fn with_transition(mut self, transition: impl Into<String>) -> Self {
        self.transition = Some(transition.into());
        self
    }
}

/// What a target does when evaluated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rule {
    /// Builds a package into an install prefix
    Package,
    /// Completes a bootstrap stage, emitting its raw outputs
    Stage {
        stage: u8,
        #[serde(default)]
        native: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
    },
    /// Merges dependency install prefixes into one tool directory
    HostTools,
    /// Routes to one branch depending on a setting's bound value
    Select {
        setting: String,
        branches: BTreeMap<String, String>,
    },
    /// Forwards its single dependency
    Alias,
    /// Externally fetched archive
    Fetch { url: String },
    /// Locally supplied archive
    LocalArchive { path: PathBuf },
    /// Ambient host tools
    HostToolchain,
    /// Ambient cross tools plus a sysroot dependency
    CrossToolchain,
    /// Toolchain bridged from a bootstrap stage
    BootstrapToolchain,
    /// Toolchain projected out of an unpacked archive
    PrebuiltToolchain {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
        /// The archive ships host tools under `host-tools/`
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        host_tools: bool,
    },
}

impl Rule {
    /// Rule kind as written in the graph
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Stage { .. } => "stage",
            Self::HostTools => "host_tools",
            Self::Select { .. } => "select",
            Self::Alias => "alias",
            Self::Fetch { .. } => "fetch",
            Self::LocalArchive { .. } => "local_archive",
            Self::HostToolchain => "host_toolchain",
            Self::CrossToolchain => "cross_toolchain",
            Self::BootstrapToolchain => "bootstrap_toolchain",
            Self::PrebuiltToolchain { .. } => "prebuilt_toolchain",
        }
    }

    /// Whether evaluating this rule schedules a build action
    ///
    /// Routing rules (select, alias, toolchain wrappers) only forward or
    /// describe outputs produced elsewhere.
    pub fn produces_action(&self) -> bool {
        matches!(
            self,
            Self::Package
                | Self::Stage { .. }
                | Self::HostTools
                | Self::Fetch { .. }
                | Self::LocalArchive { .. }
        )
    }
}

/// One unconfigured target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDef {
    pub rule: Rule,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<Dep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl TargetDef {
    pub fn new(rule: Rule) -> Self {
        Self {
            rule,
            deps: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn dep(mut self, dep: Dep) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }
}

/// A declarative, unconfigured build graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildGraph {
    /// Triple every toolchain in the graph targets
    pub target_triple: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub targets: BTreeMap<String, TargetDef>,
}

impl BuildGraph {
    /// Create an empty graph with the standard settings and transitions
    pub fn new(target_triple: impl Into<String>) -> Self {
        Self {
            target_triple: target_triple.into(),
            settings: Settings::standard(),
            transitions: Transition::canonical(),
            targets: BTreeMap::new(),
        }
    }

    /// Add (or replace) a target
    pub fn add(&mut self, name: impl Into<String>, def: TargetDef) {
        self.targets.insert(name.into(), def);
    }

    pub fn target(&self, name: &str) -> Option<&TargetDef> {
        self.targets.get(name)
    }

    /// Look up a transition by name
    pub fn transition(&self, name: &str) -> std::result::Result<&Transition, ConfigError> {
        self.transitions
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConfigError::UnknownTransition(name.to_string()))
    }

    /// Check settings and every transition against the registry
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.settings.validate()?;
        for t in &self.transitions {
            t.check(&self.settings)?;
        }
        Ok(())
    }

    /// Parse a graph from TOML
    pub fn from_toml(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a graph from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Relative output path for a target name: `//stage1:glibc` -> `stage1/glibc`
pub fn target_path(name: &str) -> PathBuf {
    let trimmed = name.trim_start_matches("//");
    trimmed
        .split([':', '/'])
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transition::DEFAULT_RESET;

    fn sample() -> BuildGraph {
        let mut graph = BuildGraph::new("x86_64-kindling-linux-gnu");
        graph.add("//host:toolchain", TargetDef::new(Rule::HostToolchain));
        graph.add(
            "//pkg:make",
            TargetDef::new(Rule::Package)
                .dep(Dep::new("//host:toolchain").with_role(DepRole::Toolchain))
                .label("kindling:build:autotools"),
        );
        graph.add(
            "//stage2:host-tools",
            TargetDef::new(Rule::HostTools).dep(Dep::new("//pkg:make").with_transition(DEFAULT_RESET)),
        );
        graph
    }

    #[test]
    fn test_target_path() {
        assert_eq!(target_path("//stage1:glibc"), PathBuf::from("stage1/glibc"));
        assert_eq!(target_path("//:stage3"), PathBuf::from("stage3"));
        assert_eq!(target_path("//a/b:c"), PathBuf::from("a/b/c"));
    }

    #[test]
    fn test_rule_kinds() {
        assert!(Rule::Package.produces_action());
        assert!(Rule::HostTools.produces_action());
        assert!(!Rule::Alias.produces_action());
        assert!(!Rule::BootstrapToolchain.produces_action());
        assert_eq!(Rule::CrossToolchain.kind(), "cross_toolchain");
    }

    #[test]
    fn test_toml_round_trip() {
        let graph = sample();
        let text = graph.to_toml().unwrap();
        let parsed = BuildGraph::from_toml(&text).unwrap();
        assert_eq!(parsed, graph);
    }

    #[test]
    fn test_parse_handwritten_graph() {
        let text = r#"
target_triple = "aarch64-kindling-linux-gnu"

[settings.toolchain_mode]
values = ["host", "seed", "stage1", "stage2"]
default = "seed"

[[transitions]]
name = "bootstrap-escape"
bindings = { toolchain_mode = "host" }

[targets."//host:toolchain"]
rule = { kind = "host_toolchain" }

[targets."//stage1:binutils"]
rule = { kind = "package" }
deps = [{ target = "//host:toolchain", role = "toolchain", transition = "bootstrap-escape" }]
labels = ["kindling:compile"]

[targets."//toolchain:select"]
rule = { kind = "select", setting = "toolchain_mode", branches = { host = "//host:toolchain" } }
"#;
        let graph = BuildGraph::from_toml(text).unwrap();
        assert!(graph.validate().is_ok());
        let binutils = graph.target("//stage1:binutils").unwrap();
        assert_eq!(binutils.rule, Rule::Package);
        assert_eq!(binutils.deps[0].role, DepRole::Toolchain);
        assert_eq!(
            binutils.deps[0].transition.as_deref(),
            Some("bootstrap-escape")
        );
        assert!(matches!(
            graph.target("//toolchain:select").unwrap().rule,
            Rule::Select { .. }
        ));
    }

    #[test]
    fn test_unknown_transition() {
        let graph = sample();
        assert!(graph.transition(DEFAULT_RESET).is_ok());
        assert_eq!(
            graph.transition("stage9-hermetic"),
            Err(ConfigError::UnknownTransition("stage9-hermetic".to_string()))
        );
    }
}
