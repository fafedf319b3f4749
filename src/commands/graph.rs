// src/commands/graph.rs

//! Plan, evaluate, verify and status commands

use super::load_config;
use anyhow::{Context, Result};
use kindling::bootstrap::{BootstrapPlan, BootstrapStage, StageState};
use kindling::graph::{BuildGraph, EvaluatedGraph, Evaluator};
use kindling::verify::Verifier;
use std::path::Path;
use tracing::info;

fn generate(config: Option<&str>) -> Result<BootstrapPlan> {
    let config = load_config(config)?;
    BootstrapPlan::generate(&config).context("Failed to generate bootstrap plan")
}

/// Print the generated graph as TOML
pub fn cmd_plan(config: Option<&str>, output: Option<&str>) -> Result<()> {
    let plan = generate(config)?;
    let text = plan.graph().to_toml()?;

    match output {
        Some(path) => {
            std::fs::write(path, &text).with_context(|| format!("Failed to write {}", path))?;
            println!(
                "Wrote {} targets for {} to {}",
                plan.graph().targets.len(),
                plan.graph().target_triple,
                path
            );
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn print_nodes(evaluated: &EvaluatedGraph) {
    for node in evaluated.nodes() {
        let marker = if node.action { "*" } else { " " };
        println!(
            "  {} {:<28} {:<24} {}",
            marker,
            node.key.target,
            node.key.context.to_string(),
            node.rule
        );
    }
    let actions = evaluated.nodes().filter(|n| n.action).count();
    println!(
        "\n{} configured nodes, {} actions (marked *)",
        evaluated.len(),
        actions
    );
}

/// Evaluate the generated plan, or a graph file, and list configured nodes
pub fn cmd_evaluate(
    config: Option<&str>,
    graph: Option<&str>,
    target: &str,
    json: bool,
) -> Result<()> {
    let evaluated = match graph {
        Some(path) => {
            let config = load_config(config)?;
            let graph = BuildGraph::load(Path::new(path))
                .with_context(|| format!("Failed to load graph from {}", path))?;
            info!("Evaluating {} from {}", target, path);
            let mut evaluator = Evaluator::new(&graph, &config.output_root);
            evaluator.evaluate_default(target)?;
            evaluator.finish()
        }
        None => generate(config)?.evaluate()?,
    };

    if json {
        println!("{}", evaluated.to_json()?);
    } else {
        print_nodes(&evaluated);
    }
    Ok(())
}

/// Run the standard invariant suite; exits 1 on any failed assertion
pub fn cmd_verify(config: Option<&str>) -> Result<()> {
    let plan = generate(config)?;
    let evaluated = plan.evaluate()?;

    let report = Verifier::new(&evaluated)
        .with_namespace(&plan.config().label_namespace)
        .standard_suite(&plan);
    println!("{}", report);

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Feed each expected stage record to a stage manager and report the result
pub fn cmd_status(config: Option<&str>) -> Result<()> {
    let plan = generate(config)?;
    let evaluated = plan.evaluate()?;
    let records = plan.stage_records(&evaluated);
    let manager = plan.check_outputs(&evaluated);

    let config = plan.config();
    println!(
        "Bootstrap status for {} (seed: {})",
        config.triple(),
        plan.seed().name()
    );
    println!(
        "  linux {}, binutils {}, gcc {}, glibc {}, {} jobs\n",
        config.kernel_version,
        config.binutils_version,
        config.gcc_version,
        config.glibc_version,
        config.jobs
    );

    for (stage, summary) in manager.summary() {
        let tag = match manager.get(stage) {
            StageState::Complete { .. } | StageState::Skipped { .. } => "[OK]",
            StageState::Pending => "[MISSING]",
            StageState::Failed { .. } | StageState::Blocked { .. } => "[ERROR]",
        };
        println!("  {} {}: {}", tag, stage, summary);
        if matches!(manager.get(stage), StageState::Pending) {
            if let Some(missing) = records.get(&stage).and_then(|r| r.first_missing()) {
                println!("        missing {}", missing.display());
            }
        }
    }

    match manager.current_stage() {
        Some(BootstrapStage::Seed) => println!("\nNext: provide the seed toolchain"),
        Some(stage) => println!("\nNext: build {}", stage),
        None => println!("\n[OK] All stages complete"),
    }
    Ok(())
}
