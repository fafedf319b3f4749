// src/transition.rs

//! Configuration transitions
//!
//! A transition forks the context a dependency subgraph is evaluated in.
//! Application is a pure function of the parent context: it reads nothing
//! else, writes nothing, and yields equal outputs for equal inputs, which
//! is what lets the evaluator deduplicate (target, context) pairs.
//!
//! Three transitions are canonical:
//!
//! - `default-reset` forces `toolchain_mode` back to `seed`. It sits on the
//!   edge from a later stage's toolchain to the host tools aggregation so
//!   host tool resolution never depends on the stage it feeds.
//! - `bootstrap-escape` binds `toolchain_mode` to `host`.
//! - `stageN-hermetic` binds `toolchain_mode` to `stage{N-1}`, so the
//!   subgraph is rebuilt with the previous stage's output only.

use crate::context::{Context, Settings, ToolchainMode, TOOLCHAIN_MODE};
use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name of the canonical default-reset transition
pub const DEFAULT_RESET: &str = "default-reset";

/// Name of the canonical bootstrap-escape transition
pub const BOOTSTRAP_ESCAPE: &str = "bootstrap-escape";

/// A named, total rebinding of one or more settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Transition name
    pub name: String,
    /// Setting -> value bindings applied atomically
    pub bindings: BTreeMap<String, String>,
}

impl Transition {
    /// Create a transition that rebinds a single setting
    pub fn new(
        name: impl Into<String>,
        setting: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(setting.into(), value.into());
        Self {
            name: name.into(),
            bindings,
        }
    }

    /// Create a transition that rebinds several settings at once
    pub fn multi<I, K, V>(name: impl Into<String>, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            bindings: bindings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Rebind the toolchain mode to the seed toolchain
    pub fn default_reset() -> Self {
        Self::new(DEFAULT_RESET, TOOLCHAIN_MODE, ToolchainMode::Seed.as_value())
    }

    /// Rebind the toolchain mode to ambient host tools
    pub fn bootstrap_escape() -> Self {
        Self::new(
            BOOTSTRAP_ESCAPE,
            TOOLCHAIN_MODE,
            ToolchainMode::Host.as_value(),
        )
    }

    /// Rebind the toolchain mode to the output of stage `n - 1`
    ///
    /// Only stages 2 and 3 are rebuilt hermetically.
    pub fn stage_hermetic(n: u8) -> std::result::Result<Self, ConfigError> {
        if !(2..=3).contains(&n) {
            return Err(ConfigError::InvalidStage(n));
        }
        Ok(Self::new(
            Self::stage_hermetic_name(n),
            TOOLCHAIN_MODE,
            ToolchainMode::Stage(n - 1).as_value(),
        ))
    }

    /// Name of the hermetic transition for stage `n`
    pub fn stage_hermetic_name(n: u8) -> String {
        format!("stage{}-hermetic", n)
    }

    /// The canonical transition set of a bootstrap graph
    pub fn canonical() -> Vec<Transition> {
        let mut all = vec![Self::default_reset(), Self::bootstrap_escape()];
        for n in 2..=3 {
            if let Ok(t) = Self::stage_hermetic(n) {
                all.push(t);
            }
        }
        all
    }

    /// Apply this transition to a parent context
    ///
    /// Every binding is checked before anything is produced, so a failure
    /// never leaves a partially rebound context behind.
    pub fn apply(&self, settings: &Settings, parent: &Context) -> Result<Context> {
        self.check(settings)
            .map_err(|e| Error::config(format!("<transition {}>", self.name), parent, e))?;

        let mut child = parent.clone();
        for (setting, value) in &self.bindings {
            child = child.with_binding(setting, value);
        }
        Ok(child)
    }

    /// Validate the transition against a settings registry
    pub fn check(&self, settings: &Settings) -> std::result::Result<(), ConfigError> {
        for (setting, value) in &self.bindings {
            let def = settings
                .get(setting)
                .ok_or_else(|| ConfigError::UndefinedSetting {
                    transition: self.name.clone(),
                    setting: setting.clone(),
                })?;
            if !def.allows(value) {
                return Err(ConfigError::InvalidValue {
                    transition: self.name.clone(),
                    setting: setting.clone(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}
