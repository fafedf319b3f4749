// src/bootstrap/stages.rs

//! Bootstrap stage state machine
//!
//! Stages are strictly ordered: seed, stage1, stage2, stage3. A stage can
//! complete only once its predecessor has completed, and only with a
//! capability record whose promised artifacts all exist. A failure blocks
//! every downstream stage; there is no degraded continuation.
//!
//! State lives for one invocation only. Nothing is persisted.

use crate::error::{Error, Result};
use crate::toolchain::BootstrapStageInfo;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Bootstrap stages in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
pub enum BootstrapStage {
    /// Seed: prebuilt or minimal from-source cross toolchain
    Seed,
    /// Stage 1: cross toolchain built with the seed
    Stage1,
    /// Stage 2: native toolchain and host tools built with stage 1
    Stage2,
    /// Stage 3: hermetic rebuild of every package with stage 2
    Stage3,
}

impl BootstrapStage {
    /// Get all stages in order
    pub fn all() -> &'static [BootstrapStage] {
        &[Self::Seed, Self::Stage1, Self::Stage2, Self::Stage3]
    }

    /// Get the next stage after this one
    pub fn next(&self) -> Option<BootstrapStage> {
        match self {
            Self::Seed => Some(Self::Stage1),
            Self::Stage1 => Some(Self::Stage2),
            Self::Stage2 => Some(Self::Stage3),
            Self::Stage3 => None,
        }
    }

    /// Get the previous stage before this one
    pub fn previous(&self) -> Option<BootstrapStage> {
        match self {
            Self::Seed => None,
            Self::Stage1 => Some(Self::Seed),
            Self::Stage2 => Some(Self::Stage1),
            Self::Stage3 => Some(Self::Stage2),
        }
    }

    /// Stage number (seed is 0)
    pub fn number(&self) -> u8 {
        match self {
            Self::Seed => 0,
            Self::Stage1 => 1,
            Self::Stage2 => 2,
            Self::Stage3 => 3,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::all().get(usize::from(n)).copied()
    }

    /// Get a human-readable name for the stage
    pub fn name(&self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
        }
    }

    /// Whether the stage runs in a hermetic (stage-forked) context
    pub fn is_hermetic(&self) -> bool {
        matches!(self, Self::Stage2 | Self::Stage3)
    }
}

impl std::fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Complete {
        record: BootstrapStageInfo,
        completed_at: chrono::DateTime<chrono::Utc>,
    },
    /// Not built in this configuration; treated as satisfied
    Skipped {
        reason: String,
    },
    Failed {
        reason: String,
    },
    Blocked {
        by: BootstrapStage,
    },
}

impl StageState {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Skipped { .. })
    }
}

static PENDING: StageState = StageState::Pending;

/// In-memory tracker of stage progress for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct StageManager {
    stages: BTreeMap<BootstrapStage, StageState>,
}

impl Default for StageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StageManager {
    /// Create a manager with every stage pending
    pub fn new() -> Self {
        Self {
            stages: BootstrapStage::all()
                .iter()
                .map(|s| (*s, StageState::Pending))
                .collect(),
        }
    }

    /// Get the state of a stage
    pub fn get(&self, stage: BootstrapStage) -> &StageState {
        self.stages.get(&stage).unwrap_or(&PENDING)
    }

    /// Check if a stage is complete
    pub fn is_complete(&self, stage: BootstrapStage) -> bool {
        self.get(stage).is_complete()
    }

    /// The capability record of a completed stage
    pub fn record(&self, stage: BootstrapStage) -> Option<&BootstrapStageInfo> {
        match self.get(stage) {
            StageState::Complete { record, .. } => Some(record),
            _ => None,
        }
    }

    /// First stage that is not complete
    pub fn current_stage(&self) -> Option<BootstrapStage> {
        BootstrapStage::all()
            .iter()
            .copied()
            .find(|s| !self.is_complete(*s))
    }

    /// Check that `stage` may start
    pub fn check_ready(&self, stage: BootstrapStage) -> Result<()> {
        if let StageState::Blocked { by } = self.get(stage) {
            return Err(Error::StageBlocked {
                stage: stage.to_string(),
                blocked_by: by.to_string(),
            });
        }
        if let Some(prev) = stage.previous() {
            if !self.is_complete(prev) {
                return Err(Error::StageOrder {
                    stage: stage.to_string(),
                    requires: prev.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Mark a stage as complete with its capability record
    ///
    /// The record is rejected unless every artifact it promises exists, so
    /// partially produced outputs never become visible to later stages.
    pub fn mark_complete(&mut self, stage: BootstrapStage, record: BootstrapStageInfo) -> Result<()> {
        self.check_ready(stage)?;
        if let Some(missing) = record.first_missing() {
            return Err(Error::IncompleteStage {
                stage: stage.to_string(),
                missing,
            });
        }

        info!("{} complete ({})", stage, record.target_triple);
        self.stages.insert(
            stage,
            StageState::Complete {
                record,
                completed_at: chrono::Utc::now(),
            },
        );
        Ok(())
    }

    /// Mark a stage as not needed, e.g. the seed when stage 1 runs on the host
    pub fn mark_skipped(&mut self, stage: BootstrapStage, reason: impl Into<String>) -> Result<()> {
        self.check_ready(stage)?;
        let reason = reason.into();
        info!("{} skipped: {}", stage, reason);
        self.stages.insert(stage, StageState::Skipped { reason });
        Ok(())
    }

    /// Mark a stage as failed and block everything after it
    pub fn mark_failed(&mut self, stage: BootstrapStage, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("{} failed: {}", stage, reason);
        self.stages.insert(stage, StageState::Failed { reason });

        let mut next = stage.next();
        while let Some(s) = next {
            self.stages.insert(s, StageState::Blocked { by: stage });
            next = s.next();
        }
    }

    /// Reset a stage (and all subsequent stages)
    pub fn reset_from(&mut self, stage: BootstrapStage) {
        let mut current = Some(stage);
        while let Some(s) = current {
            self.stages.insert(s, StageState::Pending);
            current = s.next();
        }
    }

    /// Get a summary of all stages
    pub fn summary(&self) -> Vec<(BootstrapStage, String)> {
        BootstrapStage::all()
            .iter()
            .map(|s| {
                let status = match self.get(*s) {
                    StageState::Pending => "pending".to_string(),
                    StageState::Complete { completed_at, .. } => {
                        format!("complete at {}", completed_at.format("%Y-%m-%d %H:%M:%S"))
                    }
                    StageState::Skipped { reason } => format!("skipped: {}", reason),
                    StageState::Failed { reason } => format!("failed: {}", reason),
                    StageState::Blocked { by } => format!("blocked by {}", by),
                };
                (*s, status)
            })
            .collect()
    }
}
