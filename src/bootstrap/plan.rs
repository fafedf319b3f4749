// src/bootstrap/plan.rs

//! Standard four-stage bootstrap graph
//!
//! The plan turns a [`BootstrapConfig`] into a [`BuildGraph`]:
//!
//! ```text
//! //:stage1 ──► //stage1:stage1 ──► //stage1:{linux-headers .. gcc-pass2}
//!                                        │ toolchain
//!                                        ▼
//!                               //toolchain:select ── seed ──► //seed:toolchain
//!                                                   ── host ──► //host:toolchain
//!                                                   ── stage1 ─► //stage1:toolchain
//!                                                   ── stage2 ─► //stage2:toolchain
//!
//! //:stage2 ─(stage3-hermetic)─► //stage2:toolchain
//!     ├─(stage2-hermetic)─► //stage2:stage2 ──► //stage2:gcc
//!     └─(default-reset)───► //stage2:host-tools ─(stage2-hermetic)─► //pkg:<tool>
//!
//! //:stage3 ─(stage3-hermetic)─► //stage3:image ──► //pkg:<every package>
//! ```
//!
//! The `default-reset` edge from the stage 2 toolchain to the host tools
//! aggregation is what keeps `stage3 -> host-tools -> stage2 -> stage3`
//! from ever being re-entered in the same context.

use super::config::BootstrapConfig;
use super::seed::{SeedSource, SEED_TOOLCHAIN};
use super::stages::{BootstrapStage, StageManager};
use crate::context::{ToolchainMode, TOOLCHAIN_MODE};
use crate::error::{Error, Result};
use crate::graph::{BuildGraph, Dep, DepRole, EvaluatedGraph, Evaluator, Rule, TargetDef};
use crate::label::ProvenanceLabel;
use crate::toolchain::BootstrapStageInfo;
use crate::transition::{Transition, BOOTSTRAP_ESCAPE, DEFAULT_RESET};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Terminal hermetic target
pub const ENTRY: &str = "//:stage3";
pub const STAGE1_ROOT: &str = "//:stage1";
pub const STAGE2_ROOT: &str = "//:stage2";

pub const HOST_TOOLCHAIN: &str = "//host:toolchain";
/// Routes every toolchain dependency on `toolchain_mode`
pub const TOOLCHAIN_SELECT: &str = "//toolchain:select";

pub const STAGE1_STAGE: &str = "//stage1:stage1";
pub const STAGE1_TOOLCHAIN: &str = "//stage1:toolchain";

pub const STAGE2_GCC: &str = "//stage2:gcc";
pub const STAGE2_STAGE: &str = "//stage2:stage2";
pub const HOST_TOOLS: &str = "//stage2:host-tools";
pub const STAGE2_TOOLCHAIN: &str = "//stage2:toolchain";

pub const STAGE3_IMAGE: &str = "//stage3:image";

/// Stage 1 packages in build order
pub const STAGE1_PACKAGES: &[&str] = &[
    "linux-headers",
    "binutils",
    "gcc-pass1",
    "glibc-headers",
    "glibc",
    "gcc-pass2",
];

/// Target name of a stage 1 package
pub fn stage1_target(name: &str) -> String {
    format!("//stage1:{}", name)
}

/// Target name of a package rebuilt in stage 2/3
pub fn package_target(name: &str) -> String {
    format!("//pkg:{}", name)
}

/// Target name of an upstream source fetch
pub fn source_target(name: &str) -> String {
    format!("//src:{}", name)
}

/// The generated bootstrap graph plus the configuration it came from
#[derive(Debug, Clone)]
pub struct BootstrapPlan {
    config: BootstrapConfig,
    seed: SeedSource,
    graph: BuildGraph,
}

impl BootstrapPlan {
    /// Generate the standard graph for a configuration
    pub fn generate(config: &BootstrapConfig) -> Result<Self> {
        let seed = config.seed_source()?;
        info!(
            "Generating bootstrap plan for {} (seed: {})",
            config.triple(),
            seed.name()
        );

        let mut builder = PlanBuilder {
            config,
            graph: BuildGraph::new(config.triple()),
        };
        builder.seed(&seed);
        builder.sources();
        builder.stage1();
        builder.stage2()?;
        builder.stage3();
        builder.roots()?;

        let graph = builder.graph;
        graph
            .validate()
            .map_err(|e| Error::config("<plan>", graph.settings.default_context(), e))?;
        debug!("Plan has {} targets", graph.targets.len());

        Ok(Self {
            config: config.clone(),
            seed,
            graph,
        })
    }

    pub fn graph(&self) -> &BuildGraph {
        &self.graph
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn seed(&self) -> &SeedSource {
        &self.seed
    }

    /// Targets evaluated in the default context
    pub fn roots(&self) -> [&'static str; 3] {
        [STAGE1_ROOT, STAGE2_ROOT, ENTRY]
    }

    /// Every pinned stage 1 node
    pub fn stage1_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = STAGE1_PACKAGES.iter().map(|p| stage1_target(p)).collect();
        targets.push(STAGE1_STAGE.to_string());
        targets
    }

    /// The aggregation node and every package it merges
    pub fn host_tool_targets(&self) -> Vec<String> {
        let mut targets = vec![HOST_TOOLS.to_string()];
        targets.extend(
            self.config
                .host_tool_packages
                .iter()
                .map(|p| package_target(p)),
        );
        targets
    }

    /// Evaluate every root in the default context
    pub fn evaluate(&self) -> Result<EvaluatedGraph> {
        let mut evaluator = Evaluator::new(&self.graph, &self.config.output_root);
        for root in self.roots() {
            evaluator.evaluate_default(root)?;
        }
        let evaluated = evaluator.finish();
        info!("Evaluated {} configured nodes", evaluated.len());
        Ok(evaluated)
    }

    /// Capability records each stage is expected to produce
    ///
    /// The seed record is only present when the seed toolchain was
    /// evaluated, which is not the case under `use_host_toolchain`.
    pub fn stage_records(
        &self,
        evaluated: &EvaluatedGraph,
    ) -> BTreeMap<BootstrapStage, BootstrapStageInfo> {
        let mut records = BTreeMap::new();

        if let Some(seed) = evaluated
            .nodes()
            .filter(|n| n.key.target == SEED_TOOLCHAIN)
            .find_map(|n| n.providers.toolchain.as_ref())
            .and_then(BootstrapStageInfo::from_toolchain)
        {
            records.insert(BootstrapStage::Seed, seed);
        }

        for (stage, target) in [
            (BootstrapStage::Stage1, STAGE1_STAGE),
            (BootstrapStage::Stage2, STAGE2_STAGE),
            (BootstrapStage::Stage3, STAGE3_IMAGE),
        ] {
            if let Some(record) = evaluated
                .nodes()
                .filter(|n| n.key.target == target)
                .find_map(|n| n.providers.stage.clone())
            {
                records.insert(stage, record);
            }
        }
        records
    }

    /// Drive a [`StageManager`] with the stage outputs present on disk
    ///
    /// Stages are fed in order and the walk stops at the first stage whose
    /// record is missing artifacts, leaving it and its successors pending.
    pub fn check_outputs(&self, evaluated: &EvaluatedGraph) -> StageManager {
        let records = self.stage_records(evaluated);
        let mut manager = StageManager::new();

        for &stage in BootstrapStage::all() {
            let outcome = match records.get(&stage) {
                Some(record) => manager.mark_complete(stage, record.clone()),
                None if stage == BootstrapStage::Seed && self.config.use_host_toolchain => {
                    manager.mark_skipped(stage, "stage 1 uses the host toolchain")
                }
                None => {
                    manager.mark_failed(stage, "no stage record in the evaluated graph");
                    break;
                }
            };
            if let Err(e) = outcome {
                debug!("Stopping at {}: {}", stage, e);
                break;
            }
        }
        manager
    }
}

struct PlanBuilder<'a> {
    config: &'a BootstrapConfig,
    graph: BuildGraph,
}

impl PlanBuilder<'_> {
    fn ns(&self) -> &str {
        &self.config.label_namespace
    }

    fn label(&self, label: ProvenanceLabel) -> String {
        label.render(self.ns())
    }

    /// Package rule with a toolchain edge into the select
    fn package(&self, name: &str, toolchain_transition: Option<&str>) -> TargetDef {
        let mut toolchain = Dep::new(TOOLCHAIN_SELECT).with_role(DepRole::Toolchain);
        if let Some(t) = toolchain_transition {
            toolchain = toolchain.with_transition(t);
        }
        let mut def = TargetDef::new(Rule::Package)
            .dep(toolchain)
            .label(self.label(ProvenanceLabel::Compile))
            .label(self.label(ProvenanceLabel::Build("autotools".to_string())));

        for source in self.config.sources.iter().filter(|s| s.feeds(name)) {
            def = def
                .dep(Dep::new(source_target(&source.name)).with_transition(DEFAULT_RESET))
                .label(self.label(ProvenanceLabel::Source(source.name.clone())));
        }
        def
    }

    fn stage1_escape(&self) -> Option<&'static str> {
        self.config.use_host_toolchain.then_some(BOOTSTRAP_ESCAPE)
    }

    fn stage_rule(&self, stage: u8, native: bool) -> Rule {
        Rule::Stage {
            stage,
            native,
            interpreter: Some(format!("sysroot/{}", self.config.target_arch.interpreter())),
        }
    }

    fn seed(&mut self, seed: &SeedSource) {
        let archive = match seed {
            SeedSource::Url {
                url,
                checksum,
                signature,
            } => {
                let mut def = TargetDef::new(Rule::Fetch { url: url.clone() })
                    .label(self.label(ProvenanceLabel::Url(url.clone())))
                    .label(self.label(ProvenanceLabel::Prebuilt))
                    .label(self.label(ProvenanceLabel::Download));
                if let Some(sum) = checksum {
                    def = def.label(self.label(ProvenanceLabel::Sha256(sum.clone())));
                }
                if let Some(sig) = signature {
                    def = def.label(self.label(ProvenanceLabel::Sig(sig.clone())));
                }
                def
            }
            SeedSource::Path { path, .. } => {
                TargetDef::new(Rule::LocalArchive { path: path.clone() })
                    .label(self.label(ProvenanceLabel::Prebuilt))
            }
            SeedSource::FromSource => self.package("seed", Some(BOOTSTRAP_ESCAPE)),
        };
        self.graph.add(seed.archive_label(), archive);

        self.graph.add(
            SEED_TOOLCHAIN,
            TargetDef::new(Rule::PrebuiltToolchain {
                interpreter: Some(self.config.target_arch.interpreter().to_string()),
                host_tools: self.config.seed.host_tools,
            })
            .dep(Dep::new(seed.archive_label())),
        );
        self.graph
            .add(HOST_TOOLCHAIN, TargetDef::new(Rule::HostToolchain));

        let branches: BTreeMap<String, String> = [
            (ToolchainMode::Seed, SEED_TOOLCHAIN),
            (ToolchainMode::Host, HOST_TOOLCHAIN),
            (ToolchainMode::Stage(1), STAGE1_TOOLCHAIN),
            (ToolchainMode::Stage(2), STAGE2_TOOLCHAIN),
        ]
        .into_iter()
        .map(|(mode, target)| (mode.as_value(), target.to_string()))
        .collect();
        self.graph.add(
            TOOLCHAIN_SELECT,
            TargetDef::new(Rule::Select {
                setting: TOOLCHAIN_MODE.to_string(),
                branches,
            }),
        );
    }

    fn sources(&mut self) {
        for source in &self.config.sources {
            let mut def = TargetDef::new(Rule::Fetch {
                url: source.url.clone(),
            })
            .label(self.label(ProvenanceLabel::Url(source.url.clone())))
            .label(self.label(ProvenanceLabel::Download));
            if let Some(ref sum) = source.sha256 {
                def = def.label(self.label(ProvenanceLabel::Sha256(sum.clone())));
            }
            if let Some(ref vendor) = source.vendor {
                def = def.label(self.label(ProvenanceLabel::Vendor(vendor.clone())));
            }
            if let Some(ref sig) = source.signature {
                def = def.label(self.label(ProvenanceLabel::Sig(sig.clone())));
            }
            self.graph.add(source_target(&source.name), def);
        }
    }

    fn stage1(&mut self) {
        let escape = self.stage1_escape();
        let mut previous: Option<String> = None;
        for name in STAGE1_PACKAGES {
            let mut def = self.package(name, escape);
            if let Some(prev) = previous.take() {
                def = def.dep(Dep::new(prev));
            }
            let target = stage1_target(name);
            self.graph.add(&target, def);
            previous = Some(target);
        }

        let mut toolchain = Dep::new(TOOLCHAIN_SELECT).with_role(DepRole::Toolchain);
        if let Some(t) = escape {
            toolchain = toolchain.with_transition(t);
        }
        let mut stage = TargetDef::new(self.stage_rule(1, false)).dep(toolchain);
        for name in STAGE1_PACKAGES {
            stage = stage.dep(Dep::new(stage1_target(name)));
        }
        self.graph.add(STAGE1_STAGE, stage);

        self.graph.add(
            STAGE1_TOOLCHAIN,
            TargetDef::new(Rule::BootstrapToolchain).dep(
                Dep::new(STAGE1_STAGE)
                    .with_role(DepRole::Stage)
                    .with_transition(DEFAULT_RESET),
            ),
        );
    }

    fn stage2(&mut self) -> Result<()> {
        let hermetic = hermetic_name(2)?;

        self.graph.add(STAGE2_GCC, self.package("gcc", None));
        self.graph.add(
            STAGE2_STAGE,
            TargetDef::new(self.stage_rule(2, true))
                .dep(Dep::new(TOOLCHAIN_SELECT).with_role(DepRole::Toolchain))
                .dep(Dep::new(STAGE2_GCC)),
        );

        let mut host_tools = TargetDef::new(Rule::HostTools);
        for tool in &self.config.host_tool_packages {
            host_tools = host_tools.dep(Dep::new(package_target(tool)).with_transition(&hermetic));
        }
        self.graph.add(HOST_TOOLS, host_tools);

        self.graph.add(
            STAGE2_TOOLCHAIN,
            TargetDef::new(Rule::BootstrapToolchain)
                .dep(
                    Dep::new(STAGE2_STAGE)
                        .with_role(DepRole::Stage)
                        .with_transition(&hermetic),
                )
                .dep(
                    Dep::new(HOST_TOOLS)
                        .with_role(DepRole::HostTools)
                        .with_transition(DEFAULT_RESET),
                ),
        );
        Ok(())
    }

    fn stage3(&mut self) {
        let mut seen = BTreeSet::new();
        let mut image = TargetDef::new(self.stage_rule(3, true))
            .dep(Dep::new(TOOLCHAIN_SELECT).with_role(DepRole::Toolchain));

        let packages: Vec<String> = self
            .config
            .host_tool_packages
            .iter()
            .chain(&self.config.system_packages)
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect();
        for name in &packages {
            let def = self.package(name, None);
            self.graph.add(package_target(name), def);
            image = image.dep(Dep::new(package_target(name)));
        }
        self.graph.add(STAGE3_IMAGE, image);
    }

    fn roots(&mut self) -> Result<()> {
        let hermetic = hermetic_name(3)?;
        self.graph.add(
            STAGE1_ROOT,
            TargetDef::new(Rule::Alias).dep(Dep::new(STAGE1_STAGE)),
        );
        self.graph.add(
            STAGE2_ROOT,
            TargetDef::new(Rule::Alias).dep(Dep::new(STAGE2_TOOLCHAIN).with_transition(&hermetic)),
        );
        self.graph.add(
            ENTRY,
            TargetDef::new(Rule::Alias).dep(Dep::new(STAGE3_IMAGE).with_transition(&hermetic)),
        );
        Ok(())
    }
}

/// Name of a canonical hermetic transition, checked against the canonical set
fn hermetic_name(stage: u8) -> Result<String> {
    let transition = Transition::stage_hermetic(stage)
        .map_err(|e| Error::config("<plan>", format!("stage{}", stage), e))?;
    Ok(transition.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::config::SourceSpec;
    use crate::bootstrap::seed::{SEED_FROM_SOURCE, SEED_LOCAL};
    use crate::graph::ConfiguredKey;
    use crate::toolchain::ToolchainOrigin;
    use std::path::PathBuf;

    fn config_with_path() -> BootstrapConfig {
        BootstrapConfig::new()
            .with_output_root("/out")
            .with_seed_path("/srv/seed.tar.zst")
    }

    #[test]
    fn test_generate_local_seed() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let graph = plan.graph();
        assert!(graph.target(SEED_LOCAL).is_some());
        assert!(graph.target(SEED_FROM_SOURCE).is_none());
        assert_eq!(plan.seed().archive_label(), SEED_LOCAL);
        for target in plan.stage1_targets() {
            assert!(graph.target(&target).is_some(), "{target}");
        }
    }

    #[test]
    fn test_seed_host_tools_feed_seed_toolchain() {
        let mut config = config_with_path();
        config.seed.host_tools = true;
        let plan = BootstrapPlan::generate(&config).unwrap();
        let evaluated = plan.evaluate().unwrap();
        let seed = evaluated
            .nodes()
            .find(|n| n.key.target == SEED_TOOLCHAIN)
            .unwrap();
        let tc = seed.providers.toolchain.as_ref().unwrap();
        assert!(tc.make.ends_with("seed/local/host-tools/bin/make"));

        let plain = BootstrapPlan::generate(&config_with_path()).unwrap();
        let evaluated = plain.evaluate().unwrap();
        let seed = evaluated
            .nodes()
            .find(|n| n.key.target == SEED_TOOLCHAIN)
            .unwrap();
        assert_eq!(
            seed.providers.toolchain.as_ref().unwrap().make,
            PathBuf::from("make")
        );
    }

    #[test]
    fn test_stage1_nodes_have_one_base_context() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let evaluated = plan.evaluate().unwrap();
        for target in plan.stage1_targets() {
            assert_eq!(evaluated.base_contexts_of(&target).len(), 1, "{target}");
        }
    }

    #[test]
    fn test_host_tools_resolve_in_default_context() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let evaluated = plan.evaluate().unwrap();

        let ctxs = evaluated.contexts_of(HOST_TOOLS);
        assert_eq!(ctxs.len(), 1);
        assert_eq!(ctxs[0].toolchain_mode(), Some(ToolchainMode::Seed));

        let make = evaluated.contexts_of(&package_target("make"));
        assert_eq!(make.len(), 2);
    }

    #[test]
    fn test_stage3_packages_built_with_stage2() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let evaluated = plan.evaluate().unwrap();
        let zlib: Vec<_> = evaluated
            .nodes()
            .filter(|n| n.key.target == package_target("zlib"))
            .collect();
        assert_eq!(zlib.len(), 1);
        assert_eq!(
            zlib[0].key.context.toolchain_mode(),
            Some(ToolchainMode::Stage(2))
        );
        assert_eq!(zlib[0].providers.built_with, Some(ToolchainOrigin::Bootstrap));
    }

    #[test]
    fn test_host_escape_only_reaches_stage1_toolchain() {
        let config = config_with_path().with_host_toolchain(true);
        let plan = BootstrapPlan::generate(&config).unwrap();
        let evaluated = plan.evaluate().unwrap();

        let binutils = evaluated
            .nodes()
            .find(|n| n.key.target == stage1_target("binutils"))
            .unwrap();
        assert_eq!(binutils.providers.built_with, Some(ToolchainOrigin::Host));
        assert!(!binutils.key.context.has_host_escape());
        assert!(evaluated.contexts_of(SEED_TOOLCHAIN).is_empty());
        assert!(evaluated
            .nodes()
            .filter(|n| n.key.context.is_hermetic())
            .all(|n| n.providers.built_with != Some(ToolchainOrigin::Host)));
    }

    #[test]
    fn test_from_source_seed_uses_host_toolchain() {
        let config = BootstrapConfig::new().with_output_root("/out");
        let plan = BootstrapPlan::generate(&config).unwrap();
        assert_eq!(plan.seed(), &SeedSource::FromSource);

        let evaluated = plan.evaluate().unwrap();
        let seed = evaluated
            .nodes()
            .find(|n| n.key.target == SEED_FROM_SOURCE)
            .unwrap();
        assert!(seed.action);
        assert_eq!(seed.providers.built_with, Some(ToolchainOrigin::Host));
    }

    #[test]
    fn test_sources_fetched_once() {
        let mut config = config_with_path();
        config.sources.push(SourceSpec {
            name: "gcc".to_string(),
            url: "https://ftp.gnu.org/gnu/gcc/gcc-15.2.0/gcc-15.2.0.tar.xz".to_string(),
            sha256: Some("a".repeat(64)),
            vendor: None,
            signature: Some("gcc-15.2.0.tar.xz.sig".to_string()),
        });
        let plan = BootstrapPlan::generate(&config).unwrap();
        let pass1 = plan.graph().target(&stage1_target("gcc-pass1")).unwrap();
        assert!(pass1.deps.iter().any(|d| d.target == source_target("gcc")));

        let evaluated = plan.evaluate().unwrap();
        assert_eq!(evaluated.base_contexts_of(&source_target("gcc")).len(), 1);
    }

    #[test]
    fn test_stage_records() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let evaluated = plan.evaluate().unwrap();
        let records = plan.stage_records(&evaluated);
        assert_eq!(records.len(), 4);

        let seed = &records[&BootstrapStage::Seed];
        assert!(seed.cc_artifact.ends_with("tools/bin/x86_64-kindling-linux-gnu-gcc"));

        let stage1 = &records[&BootstrapStage::Stage1];
        let seed_ctx = plan.graph().settings.default_context();
        assert!(stage1.sysroot_artifact.starts_with(PathBuf::from("/out").join(seed_ctx.hash_id())));
        assert!(records[&BootstrapStage::Stage3].cc_artifact.ends_with("bin/gcc"));
    }

    fn materialize(record: &BootstrapStageInfo) {
        std::fs::create_dir_all(&record.sysroot_artifact).unwrap();
        for path in record.artifacts() {
            if path != record.sysroot_artifact {
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, b"").unwrap();
            }
        }
    }

    #[test]
    fn test_check_outputs_stops_at_first_incomplete_stage() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_with_path().with_output_root(temp.path());
        let plan = BootstrapPlan::generate(&config).unwrap();
        let evaluated = plan.evaluate().unwrap();

        let manager = plan.check_outputs(&evaluated);
        assert_eq!(manager.current_stage(), Some(BootstrapStage::Seed));

        let records = plan.stage_records(&evaluated);
        materialize(&records[&BootstrapStage::Seed]);
        let manager = plan.check_outputs(&evaluated);
        assert!(manager.is_complete(BootstrapStage::Seed));
        assert_eq!(manager.current_stage(), Some(BootstrapStage::Stage1));
    }

    #[test]
    fn test_check_outputs_skips_seed_under_host_toolchain() {
        let temp = tempfile::tempdir().unwrap();
        let config = config_with_path()
            .with_output_root(temp.path())
            .with_host_toolchain(true);
        let plan = BootstrapPlan::generate(&config).unwrap();
        let evaluated = plan.evaluate().unwrap();

        let records = plan.stage_records(&evaluated);
        materialize(&records[&BootstrapStage::Stage1]);
        let manager = plan.check_outputs(&evaluated);
        assert!(manager.is_complete(BootstrapStage::Seed));
        assert!(manager.record(BootstrapStage::Seed).is_none());
        assert!(manager.is_complete(BootstrapStage::Stage1));
        assert_eq!(manager.current_stage(), Some(BootstrapStage::Stage2));
    }

    #[test]
    fn test_plan_graph_round_trips_through_toml() {
        let plan = BootstrapPlan::generate(&config_with_path()).unwrap();
        let text = plan.graph().to_toml().unwrap();
        let parsed = BuildGraph::from_toml(&text).unwrap();
        assert_eq!(&parsed, plan.graph());

        let root = ConfiguredKey::new(ENTRY, parsed.settings.default_context());
        let mut eval = Evaluator::new(&parsed, "/out");
        eval.evaluate(&root.target, &root.context).unwrap();
        assert!(eval.graph().contains(&root));
    }
}
