// src/graph/evaluate.rs

//! Memoized graph evaluation
//!
//! The evaluator threads an explicit [`Context`] through every call. Each
//! (target, context) pair is evaluated at most once; a dependency edge that
//! carries a transition evaluates its target in the derived context. A
//! pair that is re-entered while still being evaluated is a cycle and is
//! reported with the full configured path.
//!
//! Provider checks happen here, before any action is recorded: a node whose
//! dependency lacks a required capability fails with a configuration error
//! naming the node and its context.

use super::evaluated::{ConfiguredKey, EvaluatedGraph, EvaluatedNode};
use super::{target_path, BuildGraph, Dep, DepRole, Rule, TargetDef};
use crate::context::Context;
use crate::error::{ConfigError, Error, Result};
use crate::toolchain::{
    prebuilt_host_bin_dir, BootstrapStageInfo, InstallPrefix, ToolchainInfo, ToolchainOrigin,
    ToolchainSource,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Capabilities a node exposes to its consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Providers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_prefix: Option<InstallPrefix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toolchain: Option<ToolchainInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<BootstrapStageInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_bin_dir: Option<PathBuf>,
    /// Origin of the toolchain this node was built with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_with: Option<ToolchainOrigin>,
}

/// A resolved dependency edge
struct Resolved<'a> {
    dep: &'a Dep,
    key: ConfiguredKey,
    providers: Providers,
}

/// Memoizing evaluator over a [`BuildGraph`]
pub struct Evaluator<'g> {
    graph: &'g BuildGraph,
    output_root: PathBuf,
    evaluated: EvaluatedGraph,
    in_progress: Vec<ConfiguredKey>,
}

impl<'g> Evaluator<'g> {
    pub fn new(graph: &'g BuildGraph, output_root: impl Into<PathBuf>) -> Self {
        Self {
            graph,
            output_root: output_root.into(),
            evaluated: EvaluatedGraph::new(),
            in_progress: Vec::new(),
        }
    }

    /// Evaluate a target in the graph's default context
    pub fn evaluate_default(&mut self, target: &str) -> Result<Providers> {
        let ctx = self.graph.settings.default_context();
        self.evaluate(target, &ctx)
    }

    /// Evaluate `target` in `ctx`, returning the providers it exposes
    pub fn evaluate(&mut self, target: &str, ctx: &Context) -> Result<Providers> {
        let key = ConfiguredKey::new(target, ctx.clone());
        if let Some(node) = self.evaluated.get(&key) {
            return Ok(node.providers.clone());
        }

        if let Some(pos) = self.in_progress.iter().position(|k| *k == key) {
            let mut path: Vec<String> = self.in_progress[pos..]
                .iter()
                .map(ToString::to_string)
                .collect();
            path.push(key.to_string());
            return Err(Error::config(
                target,
                ctx,
                ConfigError::DependencyCycle(path.join(" -> ")),
            ));
        }

        let graph = self.graph;
        let def = graph
            .target(target)
            .ok_or_else(|| Error::config(target, ctx, ConfigError::UnknownTarget(target.to_string())))?;

        self.in_progress.push(key.clone());
        let result = self.evaluate_uncached(&key, def);
        self.in_progress.pop();

        let node = result?;
        debug!("Evaluated {} as {}", key, node.rule);
        let providers = node.providers.clone();
        self.evaluated.insert(node)?;
        Ok(providers)
    }

    /// The evaluated graph so far
    pub fn graph(&self) -> &EvaluatedGraph {
        &self.evaluated
    }

    pub fn finish(self) -> EvaluatedGraph {
        self.evaluated
    }

    fn evaluate_uncached(&mut self, key: &ConfiguredKey, def: &'g TargetDef) -> Result<EvaluatedNode> {
        let graph = self.graph;
        let ctx = &key.context;
        let select_dep;

        let mut resolved = Vec::with_capacity(def.deps.len() + 1);
        for dep in &def.deps {
            let child_ctx = match dep.transition {
                Some(ref name) => {
                    let transition = graph
                        .transition(name)
                        .map_err(|e| Error::config(&key.target, ctx, e))?;
                    transition
                        .check(&graph.settings)
                        .map_err(|e| Error::config(&key.target, ctx, e))?;
                    transition.apply(&graph.settings, ctx)?
                }
                None => ctx.clone(),
            };
            let providers = self.evaluate(&dep.target, &child_ctx)?;
            resolved.push(Resolved {
                dep,
                key: ConfiguredKey::new(&dep.target, child_ctx),
                providers,
            });
        }

        if let Rule::Select {
            ref setting,
            ref branches,
        } = def.rule
        {
            let value = ctx.get(setting).unwrap_or("<unbound>");
            let branch = branches.get(value).ok_or_else(|| {
                Error::config(
                    &key.target,
                    ctx,
                    ConfigError::NoSelectBranch {
                        setting: setting.clone(),
                        value: value.to_string(),
                    },
                )
            })?;
            select_dep = Dep::new(branch.clone());
            let providers = self.evaluate(branch, ctx)?;
            resolved.push(Resolved {
                dep: &select_dep,
                key: ConfiguredKey::new(branch, ctx.clone()),
                providers,
            });
        }

        let action = def.rule.produces_action();
        let out_dir = action.then(|| {
            self.output_root
                .join(ctx.hash_id())
                .join(target_path(&key.target))
        });

        let (providers, inputs) = self
            .resolve(&def.rule, out_dir.as_deref(), &resolved)
            .map_err(|e| Error::config(&key.target, ctx, e))?;

        Ok(EvaluatedNode {
            key: key.clone(),
            rule: def.rule.kind(),
            action,
            out_dir,
            inputs,
            providers,
            deps: resolved.into_iter().map(|r| r.key).collect(),
            labels: def.labels.clone(),
        })
    }

    /// Compute a node's providers from its rule and resolved dependencies
    fn resolve(
        &self,
        rule: &Rule,
        out_dir: Option<&Path>,
        deps: &[Resolved<'_>],
    ) -> std::result::Result<(Providers, Vec<PathBuf>), ConfigError> {
        let triple = self.graph.target_triple.as_str();
        let out = out_dir.map(Path::to_path_buf).unwrap_or_default();
        let mut providers = Providers::default();
        let mut inputs = Vec::new();

        match rule {
            Rule::Package => {
                if let Some(tc) = optional_toolchain(deps)? {
                    providers.built_with = Some(tc.origin);
                }
                providers.install_prefix = Some(InstallPrefix::new(out));
            }
            Rule::Stage {
                native,
                interpreter,
                ..
            } => {
                if let Some(tc) = optional_toolchain(deps)? {
                    providers.built_with = Some(tc.origin);
                }
                let stage = BootstrapStageInfo::in_dir(&out, triple, *native, interpreter.as_deref());
                providers.install_prefix = Some(InstallPrefix::new(stage.sysroot_artifact.clone()));
                providers.stage = Some(stage);
            }
            Rule::HostTools => {
                for r in deps {
                    let prefix = r.providers.install_prefix.as_ref().ok_or_else(|| {
                        ConfigError::MissingProvider {
                            dep: r.dep.target.clone(),
                            provider: "InstallPrefix",
                        }
                    })?;
                    inputs.push(prefix.prefix_path.clone());
                }
                providers.host_bin_dir = Some(out.join("bin"));
                providers.install_prefix = Some(InstallPrefix::new(out));
            }
            Rule::Fetch { .. } | Rule::LocalArchive { .. } => {
                providers.install_prefix = Some(InstallPrefix::new(out));
            }
            Rule::Select { .. } => {
                // the branch is always the last resolved edge
                if let Some(branch) = deps.last() {
                    providers = branch.providers.clone();
                }
            }
            Rule::Alias => {
                let only = deps
                    .first()
                    .ok_or(ConfigError::MissingDependency { role: "default" })?;
                providers = only.providers.clone();
            }
            Rule::HostToolchain => {
                providers.toolchain = Some(
                    ToolchainSource::Host {
                        target_triple: triple.to_string(),
                    }
                    .resolve(),
                );
            }
            Rule::CrossToolchain => {
                let sysroot = required_dep(deps, DepRole::Sysroot)?;
                let prefix = sysroot.providers.install_prefix.clone().ok_or_else(|| {
                    ConfigError::MissingProvider {
                        dep: sysroot.dep.target.clone(),
                        provider: "InstallPrefix",
                    }
                })?;
                providers.toolchain = Some(
                    ToolchainSource::Cross {
                        target_triple: triple.to_string(),
                        sysroot: prefix,
                    }
                    .resolve(),
                );
            }
            Rule::BootstrapToolchain => {
                let stage_dep = required_dep(deps, DepRole::Stage)?;
                let stage = stage_dep.providers.stage.clone().ok_or_else(|| {
                    ConfigError::MissingProvider {
                        dep: stage_dep.dep.target.clone(),
                        provider: "BootstrapStageInfo",
                    }
                })?;
                providers.toolchain = Some(
                    ToolchainSource::Bootstrap {
                        stage,
                        host_bin_dir: optional_host_bin_dir(deps)?,
                    }
                    .resolve(),
                );
            }
            Rule::PrebuiltToolchain {
                interpreter,
                host_tools,
            } => {
                let archive = required_dep(deps, DepRole::Default)?;
                let prefix = archive.providers.install_prefix.as_ref().ok_or_else(|| {
                    ConfigError::MissingProvider {
                        dep: archive.dep.target.clone(),
                        provider: "InstallPrefix",
                    }
                })?;
                // an explicit host tools dependency wins over the bundled tree
                let host_bin_dir = match optional_host_bin_dir(deps)? {
                    Some(dir) => Some(dir),
                    None => host_tools.then(|| prebuilt_host_bin_dir(&prefix.prefix_path)),
                };
                providers.toolchain = Some(
                    ToolchainSource::Prebuilt {
                        archive_dir: prefix.prefix_path.clone(),
                        target_triple: triple.to_string(),
                        host_bin_dir,
                        interpreter: interpreter.clone(),
                    }
                    .resolve(),
                );
            }
        }

        Ok((providers, inputs))
    }
}

fn required_dep<'a, 'b>(
    deps: &'a [Resolved<'b>],
    role: DepRole,
) -> std::result::Result<&'a Resolved<'b>, ConfigError> {
    deps.iter()
        .find(|r| r.dep.role == role)
        .ok_or(ConfigError::MissingDependency { role: role.name() })
}

fn optional_toolchain<'a>(
    deps: &'a [Resolved<'_>],
) -> std::result::Result<Option<&'a ToolchainInfo>, ConfigError> {
    match deps.iter().find(|r| r.dep.role == DepRole::Toolchain) {
        Some(r) => r
            .providers
            .toolchain
            .as_ref()
            .map(Some)
            .ok_or_else(|| ConfigError::MissingProvider {
                dep: r.dep.target.clone(),
                provider: "ToolchainInfo",
            }),
        None => Ok(None),
    }
}

fn optional_host_bin_dir(
    deps: &[Resolved<'_>],
) -> std::result::Result<Option<PathBuf>, ConfigError> {
    match deps.iter().find(|r| r.dep.role == DepRole::HostTools) {
        Some(r) => r
            .providers
            .host_bin_dir
            .clone()
            .map(Some)
            .ok_or_else(|| ConfigError::MissingProvider {
                dep: r.dep.target.clone(),
                provider: "host_bin_dir",
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ToolchainMode, TOOLCHAIN_MODE};
    use crate::graph::TargetDef;
    use crate::transition::{BOOTSTRAP_ESCAPE, DEFAULT_RESET};
    use std::collections::BTreeMap;

    const TRIPLE: &str = "x86_64-kindling-linux-gnu";

    fn select_graph() -> BuildGraph {
        let mut graph = BuildGraph::new(TRIPLE);
        graph.add("//host:toolchain", TargetDef::new(Rule::HostToolchain));
        graph.add(
            "//seed:local",
            TargetDef::new(Rule::LocalArchive {
                path: PathBuf::from("/srv/seed.tar.zst"),
            }),
        );
        graph.add(
            "//seed:toolchain",
            TargetDef::new(Rule::PrebuiltToolchain {
                interpreter: None,
                host_tools: false,
            })
            .dep(Dep::new("//seed:local")),
        );
        let mut branches = BTreeMap::new();
        branches.insert("seed".to_string(), "//seed:toolchain".to_string());
        branches.insert("host".to_string(), "//host:toolchain".to_string());
        graph.add(
            "//toolchain:select",
            TargetDef::new(Rule::Select {
                setting: TOOLCHAIN_MODE.to_string(),
                branches,
            }),
        );
        graph
    }

    fn package(toolchain_transition: Option<&str>) -> TargetDef {
        let mut dep = Dep::new("//toolchain:select").with_role(DepRole::Toolchain);
        if let Some(t) = toolchain_transition {
            dep = dep.with_transition(t);
        }
        TargetDef::new(Rule::Package).dep(dep)
    }

    #[test]
    fn test_select_routes_on_toolchain_mode() {
        let mut graph = select_graph();
        graph.add("//pkg:zlib", package(None));
        graph.add("//pkg:m4", package(Some(BOOTSTRAP_ESCAPE)));

        let mut eval = Evaluator::new(&graph, "/out");
        let zlib = eval.evaluate_default("//pkg:zlib").unwrap();
        let m4 = eval.evaluate_default("//pkg:m4").unwrap();

        assert_eq!(zlib.built_with, Some(ToolchainOrigin::Prebuilt));
        assert_eq!(m4.built_with, Some(ToolchainOrigin::Host));

        let evaluated = eval.finish();
        assert_eq!(evaluated.contexts_of("//toolchain:select").len(), 2);
        assert_eq!(evaluated.base_contexts_of("//pkg:zlib").len(), 1);
    }

    #[test]
    fn test_output_dir_keyed_by_context_hash() {
        let mut graph = select_graph();
        graph.add("//pkg:zlib", package(None));
        let mut eval = Evaluator::new(&graph, "/out");
        let ctx = graph.settings.default_context();
        let providers = eval.evaluate("//pkg:zlib", &ctx).unwrap();
        assert_eq!(
            providers.install_prefix.unwrap().prefix_path,
            PathBuf::from(format!("/out/{}/pkg/zlib", ctx.hash_id()))
        );
    }

    #[test]
    fn test_memoization_reuses_node() {
        let mut graph = select_graph();
        graph.add("//pkg:a", package(None));
        graph.add("//pkg:b", package(None).dep(Dep::new("//pkg:a")));
        graph.add(
            "//pkg:c",
            package(None).dep(Dep::new("//pkg:a")).dep(Dep::new("//pkg:b")),
        );

        let mut eval = Evaluator::new(&graph, "/out");
        eval.evaluate_default("//pkg:c").unwrap();
        let evaluated = eval.finish();
        assert_eq!(evaluated.contexts_of("//pkg:a").len(), 1);
        assert_eq!(evaluated.contexts_of("//seed:local").len(), 1);
    }

    #[test]
    fn test_cross_toolchain_requires_install_prefix() {
        let mut graph = select_graph();
        graph.add(
            "//cross:toolchain",
            TargetDef::new(Rule::CrossToolchain)
                .dep(Dep::new("//host:toolchain").with_role(DepRole::Sysroot)),
        );
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate_default("//cross:toolchain").unwrap_err();
        match err {
            Error::Config { node, source, .. } => {
                assert_eq!(node, "//cross:toolchain");
                assert_eq!(
                    source,
                    ConfigError::MissingProvider {
                        dep: "//host:toolchain".to_string(),
                        provider: "InstallPrefix",
                    }
                );
            }
            other => panic!("expected config error, got {other}"),
        }
        assert!(eval.graph().base_contexts_of("//cross:toolchain").is_empty());
    }

    #[test]
    fn test_cross_toolchain_with_sysroot_prefix() {
        let mut graph = select_graph();
        graph.add(
            "//cross:toolchain",
            TargetDef::new(Rule::CrossToolchain)
                .dep(Dep::new("//seed:local").with_role(DepRole::Sysroot)),
        );
        let mut eval = Evaluator::new(&graph, "/out");
        let tc = eval
            .evaluate_default("//cross:toolchain")
            .unwrap()
            .toolchain
            .unwrap();
        assert_eq!(tc.origin, ToolchainOrigin::Cross);
        assert!(tc.sysroot.unwrap().ends_with("seed/local"));
    }

    #[test]
    fn test_prebuilt_toolchain_uses_bundled_host_tools() {
        let mut graph = select_graph();
        graph.add(
            "//seed:bundled",
            TargetDef::new(Rule::PrebuiltToolchain {
                interpreter: None,
                host_tools: true,
            })
            .dep(Dep::new("//seed:local")),
        );
        let mut eval = Evaluator::new(&graph, "/out");
        let tc = eval
            .evaluate_default("//seed:bundled")
            .unwrap()
            .toolchain
            .unwrap();
        assert!(tc.make.ends_with("seed/local/host-tools/bin/make"));

        let plain = eval
            .evaluate_default("//seed:toolchain")
            .unwrap()
            .toolchain
            .unwrap();
        assert_eq!(plain.make, PathBuf::from("make"));
    }

    #[test]
    fn test_explicit_host_tools_dep_overrides_bundled() {
        let mut graph = select_graph();
        graph.add("//host:tools", TargetDef::new(Rule::HostTools));
        graph.add(
            "//seed:bundled",
            TargetDef::new(Rule::PrebuiltToolchain {
                interpreter: None,
                host_tools: true,
            })
            .dep(Dep::new("//seed:local"))
            .dep(Dep::new("//host:tools").with_role(DepRole::HostTools)),
        );
        let mut eval = Evaluator::new(&graph, "/out");
        let tc = eval
            .evaluate_default("//seed:bundled")
            .unwrap()
            .toolchain
            .unwrap();
        assert!(tc.make.ends_with("host/tools/bin/make"));
    }

    #[test]
    fn test_bootstrap_toolchain_requires_stage_record() {
        let mut graph = select_graph();
        graph.add("//pkg:gcc", package(None));
        graph.add(
            "//stage1:toolchain",
            TargetDef::new(Rule::BootstrapToolchain)
                .dep(Dep::new("//pkg:gcc").with_role(DepRole::Stage)),
        );
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate_default("//stage1:toolchain").unwrap_err();
        assert!(matches!(
            err.as_config(),
            Some(ConfigError::MissingProvider { provider: "BootstrapStageInfo", .. })
        ));
    }

    #[test]
    fn test_unknown_transition_names_consumer() {
        let mut graph = select_graph();
        graph.add("//pkg:zlib", package(Some("stage9-hermetic")));
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate_default("//pkg:zlib").unwrap_err();
        match err {
            Error::Config { node, source, .. } => {
                assert_eq!(node, "//pkg:zlib");
                assert_eq!(
                    source,
                    ConfigError::UnknownTransition("stage9-hermetic".to_string())
                );
            }
            other => panic!("expected config error, got {other}"),
        }
    }

    #[test]
    fn test_missing_select_branch() {
        let mut graph = select_graph();
        graph.add("//pkg:zlib", package(None));
        let ctx = graph
            .settings
            .default_context()
            .with_binding(TOOLCHAIN_MODE, ToolchainMode::Stage(2).as_value());
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate("//pkg:zlib", &ctx).unwrap_err();
        assert!(matches!(
            err.as_config(),
            Some(ConfigError::NoSelectBranch { value, .. }) if value == "stage2"
        ));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut graph = select_graph();
        graph.add("//pkg:a", package(None).dep(Dep::new("//pkg:b")));
        graph.add("//pkg:b", package(None).dep(Dep::new("//pkg:a")));
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate_default("//pkg:a").unwrap_err();
        match err.as_config() {
            Some(ConfigError::DependencyCycle(path)) => {
                assert!(path.starts_with("//pkg:a"));
                assert!(path.contains("//pkg:b"));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_reset_edge_breaks_context_cycle() {
        // //pkg:tools is consumed from a forked context but resolves in the
        // default one, so the fork never recurses into itself.
        let mut graph = select_graph();
        graph.add("//pkg:tools", package(None));
        graph.add(
            "//pkg:consumer",
            package(None).dep(Dep::new("//pkg:tools").with_transition(DEFAULT_RESET)),
        );
        let host = graph
            .settings
            .default_context()
            .with_binding(TOOLCHAIN_MODE, "host");
        let mut eval = Evaluator::new(&graph, "/out");
        eval.evaluate("//pkg:consumer", &host).unwrap();
        let evaluated = eval.finish();
        let ctxs = evaluated.contexts_of("//pkg:tools");
        assert_eq!(ctxs.len(), 1);
        assert_eq!(ctxs[0].toolchain_mode(), Some(ToolchainMode::Seed));
    }

    #[test]
    fn test_unknown_target() {
        let graph = select_graph();
        let mut eval = Evaluator::new(&graph, "/out");
        let err = eval.evaluate_default("//nope:nothing").unwrap_err();
        assert!(matches!(err.as_config(), Some(ConfigError::UnknownTarget(_))));
    }
}
