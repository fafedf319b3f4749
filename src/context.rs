// src/context.rs

//! Configuration contexts
//!
//! A context binds every declared constraint setting to exactly one value,
//! plus an open set of scalar build values. Contexts are immutable: every
//! change produces a new context, and equality is structural so that the
//! pair (target, context) can serve as a memoization key.
//!
//! # Toolchain mode
//!
//! The one setting every bootstrap graph declares is `toolchain_mode`:
//!
//! | Value    | Meaning                                  |
//! |----------|------------------------------------------|
//! | `seed`   | use the seed toolchain (default)         |
//! | `host`   | use ambient host PATH tools (escape)     |
//! | `stage1` | use stage 1 output (stage 2 hermetic)    |
//! | `stage2` | use stage 2 output (stage 3 hermetic)    |

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of the toolchain mode setting
pub const TOOLCHAIN_MODE: &str = "toolchain_mode";

/// Scalar build value that marks the host-PATH escape hatch
pub const HOST_ESCAPE_VALUE: &str = "use_host_toolchain";

/// Which toolchain a context asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ToolchainMode {
    /// The seed toolchain (default, unforked)
    Seed,
    /// Ambient host tools (bootstrap escape)
    Host,
    /// Output of the given stage
    Stage(u8),
}

impl ToolchainMode {
    /// All modes a standard bootstrap graph declares
    pub fn all() -> [ToolchainMode; 4] {
        [Self::Seed, Self::Host, Self::Stage(1), Self::Stage(2)]
    }

    /// Setting value for this mode
    pub fn as_value(&self) -> String {
        match self {
            Self::Seed => "seed".to_string(),
            Self::Host => "host".to_string(),
            Self::Stage(n) => format!("stage{}", n),
        }
    }

    /// Parse a setting value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "seed" => Some(Self::Seed),
            "host" => Some(Self::Host),
            _ => s
                .strip_prefix("stage")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| *n >= 1)
                .map(Self::Stage),
        }
    }

    /// Whether builds in this mode must be free of host tools
    pub fn is_hermetic(&self) -> bool {
        matches!(self, Self::Stage(_))
    }
}

impl fmt::Display for ToolchainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_value())
    }
}

/// Declaration of one constraint setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingDef {
    /// Values the setting may take
    pub values: BTreeSet<String>,
    /// Value bound in the default context
    pub default: String,
}

impl SettingDef {
    /// Create a setting from its allowed values and default
    pub fn new<I, S>(values: I, default: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            default: default.into(),
        }
    }

    /// Check whether a value is allowed
    pub fn allows(&self, value: &str) -> bool {
        self.values.contains(value)
    }
}

/// Registry of declared constraint settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    defs: BTreeMap<String, SettingDef>,
}

impl Settings {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard `toolchain_mode` setting
    pub fn standard() -> Self {
        let mut settings = Self::new();
        settings.declare(
            TOOLCHAIN_MODE,
            SettingDef::new(
                ToolchainMode::all().iter().map(|m| m.as_value()),
                ToolchainMode::Seed.as_value(),
            ),
        );
        settings
    }

    /// Declare (or redeclare) a setting
    pub fn declare(&mut self, name: impl Into<String>, def: SettingDef) {
        self.defs.insert(name.into(), def);
    }

    /// Look up a setting declaration
    pub fn get(&self, name: &str) -> Option<&SettingDef> {
        self.defs.get(name)
    }

    /// Iterate over declared settings in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingDef)> {
        self.defs.iter()
    }

    /// Check that every declaration is well formed
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, def) in &self.defs {
            if def.values.is_empty() {
                return Err(ConfigError::EmptySetting(name.clone()));
            }
            if !def.allows(&def.default) {
                return Err(ConfigError::InvalidDefault {
                    setting: name.clone(),
                    default: def.default.clone(),
                });
            }
        }
        Ok(())
    }

    /// The baseline context: every setting bound to its default
    pub fn default_context(&self) -> Context {
        Context {
            constraints: self
                .defs
                .iter()
                .map(|(name, def)| (name.clone(), def.default.clone()))
                .collect(),
            values: BTreeMap::new(),
        }
    }
}

/// An immutable configuration context
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Context {
    /// Constraint setting -> bound value (one value per setting)
    constraints: BTreeMap<String, String>,
    /// Arbitrary scalar build values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, String>,
}

impl Context {
    /// Value bound to a constraint setting
    pub fn get(&self, setting: &str) -> Option<&str> {
        self.constraints.get(setting).map(String::as_str)
    }

    /// Scalar build value
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Iterate over constraint bindings
    pub fn constraints(&self) -> impl Iterator<Item = (&str, &str)> {
        self.constraints
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Derive a context with one setting rebound
    pub fn with_binding(&self, setting: impl Into<String>, value: impl Into<String>) -> Context {
        let mut next = self.clone();
        next.constraints.insert(setting.into(), value.into());
        next
    }

    /// Derive a context with a scalar build value set
    pub fn with_value(&self, key: impl Into<String>, value: impl Into<String>) -> Context {
        let mut next = self.clone();
        next.values.insert(key.into(), value.into());
        next
    }

    /// The toolchain mode this context asks for
    pub fn toolchain_mode(&self) -> Option<ToolchainMode> {
        self.get(TOOLCHAIN_MODE).and_then(ToolchainMode::parse)
    }

    /// Whether this context is forked into a hermetic stage rebuild
    pub fn is_hermetic(&self) -> bool {
        self.toolchain_mode().is_some_and(|m| m.is_hermetic())
    }

    /// Whether the host-PATH escape hatch is bound, either as the
    /// toolchain mode or as a scalar build value
    pub fn has_host_escape(&self) -> bool {
        self.toolchain_mode() == Some(ToolchainMode::Host)
            || self.value(HOST_ESCAPE_VALUE) == Some("true")
    }

    /// Stable content hash (16 hex digits)
    pub fn hash_id(&self) -> String {
        let mut hasher = Sha256::new();
        for (k, v) in &self.constraints {
            hasher.update(b"c:");
            hasher.update(k.as_bytes());
            hasher.update([0]);
            hasher.update(v.as_bytes());
            hasher.update([0]);
        }
        for (k, v) in &self.values {
            hasher.update(b"v:");
            hasher.update(k.as_bytes());
            hasher.update([0]);
            hasher.update(v.as_bytes());
            hasher.update([0]);
        }
        hex::encode(&hasher.finalize()[..8])
    }

    /// Bind an arbitrary setting after checking it against the registry
    pub fn rebind(&self, settings: &Settings, setting: &str, value: &str) -> Result<Context> {
        let def = settings.get(setting).ok_or_else(|| {
            Error::config(
                "<context>",
                self,
                ConfigError::UndefinedSetting {
                    transition: "<rebind>".to_string(),
                    setting: setting.to_string(),
                },
            )
        })?;
        if !def.allows(value) {
            return Err(Error::config(
                "<context>",
                self,
                ConfigError::InvalidValue {
                    transition: "<rebind>".to_string(),
                    setting: setting.to_string(),
                    value: value.to_string(),
                },
            ));
        }
        Ok(self.with_binding(setting, value))
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = self.get(TOOLCHAIN_MODE).unwrap_or("unbound");
        write!(f, "{}#{}", mode, self.hash_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolchain_mode_parse() {
        assert_eq!(ToolchainMode::parse("seed"), Some(ToolchainMode::Seed));
        assert_eq!(ToolchainMode::parse("host"), Some(ToolchainMode::Host));
        assert_eq!(ToolchainMode::parse("stage2"), Some(ToolchainMode::Stage(2)));
        assert_eq!(ToolchainMode::parse("stage0"), None);
        assert_eq!(ToolchainMode::parse("stagex"), None);
        assert_eq!(ToolchainMode::parse("bogus"), None);
    }

    #[test]
    fn test_default_context_binds_every_setting() {
        let mut settings = Settings::standard();
        settings.declare("libc", SettingDef::new(["glibc", "musl"], "glibc"));

        let ctx = settings.default_context();
        assert_eq!(ctx.get(TOOLCHAIN_MODE), Some("seed"));
        assert_eq!(ctx.get("libc"), Some("glibc"));
        assert_eq!(ctx.toolchain_mode(), Some(ToolchainMode::Seed));
        assert!(!ctx.is_hermetic());
    }

    #[test]
    fn test_with_binding_does_not_mutate_parent() {
        let ctx = Settings::standard().default_context();
        let forked = ctx.with_binding(TOOLCHAIN_MODE, "stage2");

        assert_eq!(ctx.get(TOOLCHAIN_MODE), Some("seed"));
        assert_eq!(forked.get(TOOLCHAIN_MODE), Some("stage2"));
        assert!(forked.is_hermetic());
        assert_ne!(ctx, forked);
        assert_ne!(ctx.hash_id(), forked.hash_id());
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = Settings::standard().default_context().with_value("opt", "O2");
        let b = Settings::standard().default_context().with_value("opt", "O2");
        assert_eq!(a, b);
        assert_eq!(a.hash_id(), b.hash_id());
        assert_eq!(a.hash_id().len(), 16);
    }

    #[test]
    fn test_host_escape_detection() {
        let ctx = Settings::standard().default_context();
        assert!(!ctx.has_host_escape());
        assert!(ctx.with_binding(TOOLCHAIN_MODE, "host").has_host_escape());
        assert!(ctx.with_value(HOST_ESCAPE_VALUE, "true").has_host_escape());
        assert!(!ctx.with_value(HOST_ESCAPE_VALUE, "false").has_host_escape());
    }

    #[test]
    fn test_settings_validate() {
        let mut settings = Settings::new();
        settings.declare("empty", SettingDef::new(Vec::<String>::new(), "x"));
        assert_eq!(
            settings.validate(),
            Err(ConfigError::EmptySetting("empty".to_string()))
        );

        let mut settings = Settings::new();
        settings.declare("opt", SettingDef::new(["a", "b"], "c"));
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidDefault { .. })
        ));

        assert!(Settings::standard().validate().is_ok());
    }

    #[test]
    fn test_rebind_rejects_unknown_setting() {
        let settings = Settings::standard();
        let ctx = settings.default_context();
        let err = ctx.rebind(&settings, "nope", "x").unwrap_err();
        assert!(err.is_config());

        let err = ctx.rebind(&settings, TOOLCHAIN_MODE, "stage9").unwrap_err();
        assert!(matches!(
            err.as_config(),
            Some(ConfigError::InvalidValue { .. })
        ));

        let ok = ctx.rebind(&settings, TOOLCHAIN_MODE, "host").unwrap();
        assert_eq!(ok.toolchain_mode(), Some(ToolchainMode::Host));
    }

    #[test]
    fn test_display_includes_mode() {
        let ctx = Settings::standard().default_context();
        assert!(ctx.to_string().starts_with("seed#"));
    }
}
