// src/error.rs

//! Error types for the bootstrap engine
//!
//! Configuration errors are kept in their own enum and always travel with
//! the (node, context) pair they were raised for, so a caller can tell a
//! broken configuration apart from a failed build step or an IO problem.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Configuration-time failures. These abort evaluation of the affected
/// node and everything that depends on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("transition '{transition}' references undefined setting '{setting}'")]
    UndefinedSetting { transition: String, setting: String },

    #[error("transition '{transition}' binds '{setting}' to invalid value '{value}'")]
    InvalidValue {
        transition: String,
        setting: String,
        value: String,
    },

    #[error("setting '{0}' declares no values")]
    EmptySetting(String),

    #[error("setting '{setting}' default '{default}' is not one of its values")]
    InvalidDefault { setting: String, default: String },

    #[error("unknown transition '{0}'")]
    UnknownTransition(String),

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("dependency '{dep}' does not provide {provider}")]
    MissingProvider { dep: String, provider: &'static str },

    #[error("no {role} dependency declared")]
    MissingDependency { role: &'static str },

    #[error("select on '{setting}' has no branch for value '{value}'")]
    NoSelectBranch { setting: String, value: String },

    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("ambiguous seed source: {0}")]
    SeedConflict(String),

    #[error("invalid bootstrap stage number {0} (hermetic rebuilds exist for stages 2 and 3)")]
    InvalidStage(u8),
}

/// Crate-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error at {node} ({context}): {source}")]
    Config {
        node: String,
        context: String,
        #[source]
        source: ConfigError,
    },

    #[error("host tools conflict: '{name}' provided by both {first} and {second}")]
    AggregationConflict {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("cannot complete {stage}: {requires} has not completed")]
    StageOrder { stage: String, requires: String },

    #[error("{stage} is blocked by failed {blocked_by}")]
    StageBlocked { stage: String, blocked_by: String },

    #[error("{stage} output is incomplete, missing {missing}")]
    IncompleteStage { stage: String, missing: PathBuf },

    #[error("non-deterministic evaluation of {node} ({context})")]
    NonDeterministic { node: String, context: String },

    #[error("seed verification failed: expected {expected}, got {actual}")]
    SeedVerification { expected: String, actual: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("output already exists: {0}")]
    OutputExists(PathBuf),

    #[error("ELF parse error in {path}: {message}")]
    Elf { path: PathBuf, message: String },

    #[error("label error: {0}")]
    Label(#[from] crate::label::LabelParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Wrap a configuration error with the node and context it was raised for
    pub fn config(node: impl Into<String>, context: impl ToString, source: ConfigError) -> Self {
        Self::Config {
            node: node.into(),
            context: context.to_string(),
            source,
        }
    }

    /// Returns the inner configuration error, if this is one
    pub fn as_config(&self) -> Option<&ConfigError> {
        match self {
            Self::Config { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this error is a configuration error rather than a build or IO failure
    pub fn is_config(&self) -> bool {
        self.as_config().is_some()
    }
}
