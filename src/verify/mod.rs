// src/verify/mod.rs

//! Graph invariant verification
//!
//! The verifier is a read-only pass over an [`EvaluatedGraph`]. It never
//! re-evaluates anything; each check walks the recorded (target, context)
//! nodes and returns an [`Assertion`] with one diagnostic per violation.
//! Violations are reported, not raised: the report is a CI gate and does
//! not stop artifacts from being produced.

mod report;

pub use report::{Assertion, Report};

use crate::bootstrap::{BootstrapPlan, ENTRY, STAGE1_STAGE};
use crate::graph::{ConfiguredKey, EvaluatedGraph};
use crate::label::{Provenance, DEFAULT_ALLOWED_SCHEMES, DEFAULT_NAMESPACE};
use crate::toolchain::ToolchainOrigin;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Contexts a host tools node may appear in: default plus one hermetic fork
pub const HOST_TOOLS_CONTEXT_BOUND: usize = 2;

/// Checks over one evaluated graph
pub struct Verifier<'a> {
    graph: &'a EvaluatedGraph,
    namespace: String,
    allowed_schemes: Vec<String>,
}

impl<'a> Verifier<'a> {
    pub fn new(graph: &'a EvaluatedGraph) -> Self {
        Self {
            graph,
            namespace: DEFAULT_NAMESPACE.to_string(),
            allowed_schemes: DEFAULT_ALLOWED_SCHEMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Label namespace provenance is read from
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_allowed_schemes<I, S>(mut self, schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_schemes = schemes.into_iter().map(Into::into).collect();
        self
    }

    /// No target in `targets` is evaluated in more than `bound` contexts
    ///
    /// With `within`, only contexts reachable from that root count.
    pub fn config_count(
        &self,
        name: &str,
        targets: &[String],
        within: Option<&ConfiguredKey>,
        bound: usize,
    ) -> Assertion {
        let scope = within.map(|root| self.graph.closure(root));
        let mut diagnostics = Vec::new();

        for target in targets {
            let contexts: Vec<String> = self
                .graph
                .contexts_of(target)
                .into_iter()
                .filter(|ctx| {
                    scope
                        .as_ref()
                        .is_none_or(|s| s.contains(&ConfiguredKey::new(target.as_str(), (*ctx).clone())))
                })
                .map(ToString::to_string)
                .collect();
            if contexts.len() > bound {
                diagnostics.push(format!(
                    "{} has {} configs (bound {}): {}",
                    target,
                    contexts.len(),
                    bound,
                    contexts.join(", ")
                ));
            }
        }
        Assertion::from_diagnostics(name, diagnostics)
    }

    /// Every target in `targets` has exactly one base (action) context
    pub fn base_config(&self, name: &str, targets: &[String]) -> Assertion {
        let mut diagnostics = Vec::new();
        for target in targets {
            let base = self.graph.base_contexts_of(target);
            match base.len() {
                1 => {}
                0 => diagnostics.push(format!("missing base config for {}", target)),
                n => diagnostics.push(format!(
                    "multiple base configs for {} ({}): {}",
                    target,
                    n,
                    base.iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            }
        }
        Assertion::from_diagnostics(name, diagnostics)
    }

    /// Within the closure of `root`, no node schedules actions in more
    /// than `bound` contexts
    pub fn isolation(&self, name: &str, root: &str, bound: usize) -> Assertion {
        let mut per_target: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let closure = self.graph.closure_of_target(root);
        for key in &closure {
            if self.graph.get(key).is_some_and(|n| n.action) {
                per_target
                    .entry(key.target.as_str())
                    .or_default()
                    .insert(key.context.to_string());
            }
        }

        let diagnostics = per_target
            .into_iter()
            .filter(|(_, ctxs)| ctxs.len() > bound)
            .map(|(target, ctxs)| {
                format!(
                    "{} reachable from {} in {} configs: {}",
                    target,
                    root,
                    ctxs.len(),
                    ctxs.into_iter().collect::<Vec<_>>().join(", ")
                )
            })
            .collect();
        Assertion::from_diagnostics(name, diagnostics)
    }

    /// Hermetic-context nodes carry no host escape and use no host toolchain
    pub fn hermeticity(&self, name: &str) -> Assertion {
        let mut diagnostics = Vec::new();
        for node in self.graph.nodes().filter(|n| n.key.context.is_hermetic()) {
            if node.key.context.has_host_escape() {
                diagnostics.push(format!("{}: bootstrap-escape binding in hermetic context", node.key));
            }
            if node.providers.built_with == Some(ToolchainOrigin::Host) {
                diagnostics.push(format!("{}: built with the host toolchain", node.key));
            }
            if node
                .providers
                .toolchain
                .as_ref()
                .is_some_and(|tc| tc.origin == ToolchainOrigin::Host)
            {
                diagnostics.push(format!("{}: resolves to the host toolchain", node.key));
            }
        }
        Assertion::from_diagnostics(name, diagnostics)
    }

    /// Every fetch node has a complete provenance record, and every label
    /// under the namespace is well formed
    pub fn provenance(&self, name: &str) -> Assertion {
        let schemes: Vec<&str> = self.allowed_schemes.iter().map(String::as_str).collect();
        let mut diagnostics = Vec::new();
        let mut seen = BTreeSet::new();

        for node in self.graph.nodes() {
            if !seen.insert(node.key.target.as_str()) {
                continue;
            }
            let (prov, errors) = Provenance::collect(&node.labels, &self.namespace, &schemes);
            for e in errors {
                diagnostics.push(format!("{}: {}", node.key.target, e));
            }
            if node.rule == "fetch" && !prov.is_complete() {
                diagnostics.push(format!(
                    "{}: incomplete provenance, missing {}",
                    node.key.target,
                    prov.missing().join(", ")
                ));
            }
        }
        Assertion::from_diagnostics(name, diagnostics)
    }

    /// The checks every bootstrap graph must pass
    pub fn standard_suite(&self, plan: &BootstrapPlan) -> Report {
        let default_ctx = plan.graph().settings.default_context();
        let entry = ConfiguredKey::new(ENTRY, default_ctx);

        let mut report = Report::new();
        report.push(self.base_config("stage1 base configs", &plan.stage1_targets()));
        report.push(self.config_count(
            "host tools config count",
            &plan.host_tool_targets(),
            Some(&entry),
            HOST_TOOLS_CONTEXT_BOUND,
        ));
        report.push(self.isolation("stage1 isolation", STAGE1_STAGE, 1));
        report.push(self.hermeticity("hermeticity"));
        report.push(self.provenance("provenance"));

        debug!("Verification: {}", report.summary());
        report
    }
}
