// src/graph/evaluated.rs

//! The fully evaluated graph
//!
//! Nodes are keyed by (target name, context). The verifier only ever reads
//! this structure; it never re-runs evaluation.

use super::evaluate::Providers;
use crate::context::{Context, ToolchainMode};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::path::PathBuf;

/// Unique key of an evaluated node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConfiguredKey {
    pub target: String,
    pub context: Context,
}

impl ConfiguredKey {
    pub fn new(target: impl Into<String>, context: Context) -> Self {
        Self {
            target: target.into(),
            context,
        }
    }
}

impl fmt::Display for ConfiguredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.target, self.context)
    }
}

/// One (target, context) pair after evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluatedNode {
    pub key: ConfiguredKey,
    /// Rule kind
    pub rule: &'static str,
    /// Whether this node schedules a build action in its context
    pub action: bool,
    /// Output directory of the action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,
    /// Ordered input paths the action consumes (host tools prefixes)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PathBuf>,
    pub providers: Providers,
    /// Configured dependency edges, in declaration order
    pub deps: Vec<ConfiguredKey>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// All evaluated nodes of one invocation
#[derive(Debug, Clone, Default)]
pub struct EvaluatedGraph {
    nodes: BTreeMap<ConfiguredKey, EvaluatedNode>,
}

impl EvaluatedGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node
    ///
    /// A key may be inserted again only with an identical node.
    pub fn insert(&mut self, node: EvaluatedNode) -> Result<()> {
        if let Some(existing) = self.nodes.get(&node.key) {
            if *existing != node {
                return Err(Error::NonDeterministic {
                    node: node.key.target.clone(),
                    context: node.key.context.to_string(),
                });
            }
            return Ok(());
        }
        self.nodes.insert(node.key.clone(), node);
        Ok(())
    }

    pub fn get(&self, key: &ConfiguredKey) -> Option<&EvaluatedNode> {
        self.nodes.get(key)
    }

    pub fn contains(&self, key: &ConfiguredKey) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over nodes in key order
    pub fn nodes(&self) -> impl Iterator<Item = &EvaluatedNode> {
        self.nodes.values()
    }

    /// Every context a target was evaluated in
    pub fn contexts_of(&self, target: &str) -> Vec<&Context> {
        self.nodes
            .keys()
            .filter(|k| k.target == target)
            .map(|k| &k.context)
            .collect()
    }

    /// Contexts in which a target schedules a build action
    pub fn base_contexts_of(&self, target: &str) -> Vec<&Context> {
        self.nodes
            .values()
            .filter(|n| n.key.target == target && n.action)
            .map(|n| &n.key.context)
            .collect()
    }

    /// Every key reachable from `root`, including `root` itself
    pub fn closure(&self, root: &ConfiguredKey) -> BTreeSet<ConfiguredKey> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(root.clone());

        while let Some(key) = queue.pop_front() {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&key) {
                for dep in &node.deps {
                    if !seen.contains(dep) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        seen
    }

    /// Union of the closures of every evaluated instance of `target`
    pub fn closure_of_target(&self, target: &str) -> BTreeSet<ConfiguredKey> {
        let mut all = BTreeSet::new();
        for ctx in self.contexts_of(target) {
            all.extend(self.closure(&ConfiguredKey::new(target, ctx.clone())));
        }
        all
    }

    /// Nodes evaluated under a given toolchain mode
    pub fn nodes_in_mode(&self, mode: ToolchainMode) -> impl Iterator<Item = &EvaluatedNode> {
        self.nodes
            .values()
            .filter(move |n| n.key.context.toolchain_mode() == Some(mode))
    }

    /// Serialize every node as a JSON array
    pub fn to_json(&self) -> Result<String> {
        let nodes: Vec<&EvaluatedNode> = self.nodes.values().collect();
        Ok(serde_json::to_string_pretty(&nodes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Settings, TOOLCHAIN_MODE};

    fn node(target: &str, ctx: &Context, action: bool, deps: Vec<ConfiguredKey>) -> EvaluatedNode {
        EvaluatedNode {
            key: ConfiguredKey::new(target, ctx.clone()),
            rule: if action { "package" } else { "alias" },
            action,
            out_dir: None,
            inputs: Vec::new(),
            providers: Providers::default(),
            deps,
            labels: Vec::new(),
        }
    }

    #[test]
    fn test_insert_rejects_divergent_output() {
        let ctx = Settings::standard().default_context();
        let mut graph = EvaluatedGraph::new();
        graph.insert(node("//pkg:a", &ctx, true, vec![])).unwrap();
        graph.insert(node("//pkg:a", &ctx, true, vec![])).unwrap();
        assert_eq!(graph.len(), 1);

        let err = graph.insert(node("//pkg:a", &ctx, false, vec![])).unwrap_err();
        assert!(matches!(err, Error::NonDeterministic { .. }));
    }

    #[test]
    fn test_queries() {
        let seed = Settings::standard().default_context();
        let stage2 = seed.with_binding(TOOLCHAIN_MODE, "stage2");
        let a_seed = ConfiguredKey::new("//pkg:a", seed.clone());
        let b_stage2 = ConfiguredKey::new("//pkg:b", stage2.clone());

        let mut graph = EvaluatedGraph::new();
        graph.insert(node("//pkg:a", &seed, true, vec![])).unwrap();
        graph.insert(node("//pkg:a", &stage2, true, vec![])).unwrap();
        graph
            .insert(node("//pkg:b", &stage2, true, vec![a_seed.clone()]))
            .unwrap();
        graph
            .insert(node("//:root", &seed, false, vec![b_stage2.clone()]))
            .unwrap();

        assert_eq!(graph.contexts_of("//pkg:a").len(), 2);
        assert_eq!(graph.base_contexts_of("//:root").len(), 0);

        let closure = graph.closure(&ConfiguredKey::new("//:root", seed.clone()));
        assert_eq!(closure.len(), 3);
        assert!(closure.contains(&a_seed));
        assert!(!closure.contains(&ConfiguredKey::new("//pkg:a", stage2.clone())));

        assert_eq!(graph.nodes_in_mode(ToolchainMode::Stage(2)).count(), 2);
        assert!(graph.to_json().unwrap().contains("//pkg:b"));
    }
}
