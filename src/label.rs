// src/label.rs

//! Provenance labels attached to graph nodes
//!
//! Labels live under a fixed namespace and use the format
//! `<namespace>:<key>[:<value>]`:
//!
//! - `kindling:url:https://ftp.gnu.org/gnu/gcc/gcc-15.2.0.tar.xz`
//! - `kindling:sha256:<64 lowercase hex digits>`
//! - `kindling:vendor:fedora`
//! - `kindling:sig:https://ftp.gnu.org/gnu/gcc/gcc-15.2.0.tar.xz.sig`
//! - `kindling:compile`, `kindling:build:autotools`
//!
//! A value-carrying key with nothing after it (`kindling:sha256:`) is a
//! bare label and always rejected.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Default label namespace
pub const DEFAULT_NAMESPACE: &str = "kindling";

/// URL schemes accepted for fetched sources unless configured otherwise
pub const DEFAULT_ALLOWED_SCHEMES: &[&str] = &["https", "http", "ftp"];

static SHA256_HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{64}$").expect("static regex")
});

/// A parsed provenance label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProvenanceLabel {
    /// Source URL of a fetched artifact
    Url(String),
    /// SHA-256 content hash
    Sha256(String),
    /// Vendor identity (stands in for a hash on vendor-signed artifacts)
    Vendor(String),
    /// Signature reference
    Sig(String),
    /// Upstream source name
    Source(String),
    /// Build system type
    Build(String),
    /// Node compiles code
    Compile,
    /// Node is a prebuilt binary
    Prebuilt,
    /// Node downloads sources
    Download,
    /// Any other key under the namespace
    Other { key: String, value: Option<String> },
}

impl ProvenanceLabel {
    /// Parse a label under `namespace`
    ///
    /// Returns `Ok(None)` for labels in another namespace.
    pub fn parse(
        s: &str,
        namespace: &str,
        allowed_schemes: &[&str],
    ) -> Result<Option<Self>, LabelParseError> {
        let Some(rest) = s
            .strip_prefix(namespace)
            .and_then(|r| r.strip_prefix(':'))
        else {
            return Ok(None);
        };

        let (key, value) = match rest.split_once(':') {
            Some((k, v)) => (k, Some(v)),
            None => (rest, None),
        };

        if key.is_empty() {
            return Err(LabelParseError::EmptyKey(s.to_string()));
        }

        let label = match (key, value) {
            ("compile", None) => Self::Compile,
            ("prebuilt", None) => Self::Prebuilt,
            ("download", None) => Self::Download,
            ("url" | "sha256" | "vendor" | "sig" | "source" | "build", None | Some("")) => {
                return Err(LabelParseError::Bare(s.to_string()));
            }
            ("url", Some(v)) => {
                validate_url(v, allowed_schemes)?;
                Self::Url(v.to_string())
            }
            ("sha256", Some(v)) => {
                if !SHA256_HEX.is_match(v) {
                    return Err(LabelParseError::MalformedHash(v.to_string()));
                }
                Self::Sha256(v.to_string())
            }
            ("vendor", Some(v)) => Self::Vendor(v.to_string()),
            ("sig", Some(v)) => Self::Sig(v.to_string()),
            ("source", Some(v)) => Self::Source(v.to_string()),
            ("build", Some(v)) => Self::Build(v.to_string()),
            (k, v) => Self::Other {
                key: k.to_string(),
                value: v.map(str::to_string),
            },
        };
        Ok(Some(label))
    }

    /// Render the label under `namespace`
    pub fn render(&self, namespace: &str) -> String {
        match self {
            Self::Url(v) => format!("{}:url:{}", namespace, v),
            Self::Sha256(v) => format!("{}:sha256:{}", namespace, v),
            Self::Vendor(v) => format!("{}:vendor:{}", namespace, v),
            Self::Sig(v) => format!("{}:sig:{}", namespace, v),
            Self::Source(v) => format!("{}:source:{}", namespace, v),
            Self::Build(v) => format!("{}:build:{}", namespace, v),
            Self::Compile => format!("{}:compile", namespace),
            Self::Prebuilt => format!("{}:prebuilt", namespace),
            Self::Download => format!("{}:download", namespace),
            Self::Other { key, value: None } => format!("{}:{}", namespace, key),
            Self::Other {
                key,
                value: Some(v),
            } => format!("{}:{}:{}", namespace, key, v),
        }
    }
}

fn validate_url(v: &str, allowed_schemes: &[&str]) -> Result<(), LabelParseError> {
    let parsed = url::Url::parse(v).map_err(|_| LabelParseError::InvalidUrl(v.to_string()))?;
    if !allowed_schemes.contains(&parsed.scheme()) {
        return Err(LabelParseError::DisallowedScheme(parsed.scheme().to_string()));
    }
    Ok(())
}

/// Provenance fields gathered from one node's labels
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    pub url: Option<String>,
    pub sha256: Option<String>,
    pub vendor: Option<String>,
    pub sig: Option<String>,
}

impl Provenance {
    /// Collect provenance from raw labels, returning format errors alongside
    pub fn collect<'a, I>(
        labels: I,
        namespace: &str,
        allowed_schemes: &[&str],
    ) -> (Self, Vec<LabelParseError>)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut prov = Self::default();
        let mut errors = Vec::new();
        for raw in labels {
            match ProvenanceLabel::parse(raw, namespace, allowed_schemes) {
                Ok(Some(ProvenanceLabel::Url(v))) => prov.url = Some(v),
                Ok(Some(ProvenanceLabel::Sha256(v))) => prov.sha256 = Some(v),
                Ok(Some(ProvenanceLabel::Vendor(v))) => prov.vendor = Some(v),
                Ok(Some(ProvenanceLabel::Sig(v))) => prov.sig = Some(v),
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
        (prov, errors)
    }

    /// Names of the fields still missing for a complete record
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.url.is_none() {
            missing.push("url");
        }
        if self.sha256.is_none() && self.vendor.is_none() {
            missing.push("sha256 or vendor");
        }
        if self.sig.is_none() {
            missing.push("sig");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }
}

/// Errors that can occur when parsing a provenance label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelParseError {
    /// Namespace followed by an empty key
    EmptyKey(String),
    /// Value-carrying key with an empty value
    Bare(String),
    /// sha256 value is not 64 lowercase hex digits
    MalformedHash(String),
    /// URL does not parse
    InvalidUrl(String),
    /// URL scheme is not allowed
    DisallowedScheme(String),
}

impl fmt::Display for LabelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelParseError::EmptyKey(s) => write!(f, "Empty key in label: {}", s),
            LabelParseError::Bare(s) => write!(f, "Bare label (empty value): {}", s),
            LabelParseError::MalformedHash(s) => {
                write!(f, "Malformed sha256 (want 64 hex digits): {}", s)
            }
            LabelParseError::InvalidUrl(s) => write!(f, "Invalid URL: {}", s),
            LabelParseError::DisallowedScheme(s) => write!(f, "Disallowed URL scheme: {}", s),
        }
    }
}

impl std::error::Error for LabelParseError {}
