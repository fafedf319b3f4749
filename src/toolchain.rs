// src/toolchain.rs

//! Toolchain capability records
//!
//! A [`ToolchainInfo`] describes how to invoke a compiler toolchain: the
//! tools, the target triple, and an optional sysroot that is injected into
//! every compile and link command. Package nodes consume this record and
//! never need to know which of the four resolution strategies produced it.
//!
//! | Variant     | Tools                        | Sysroot                       |
//! |-------------|------------------------------|-------------------------------|
//! | host        | bare ambient names (`cc`)    | none                          |
//! | cross       | ambient `<triple>-gcc` names | install prefix of a dependency|
//! | bootstrap   | artifacts of a stage         | the stage's sysroot artifact  |
//! | prebuilt    | `tools/bin/<triple>-gcc` ... | `tools/<triple>/sys-root`     |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory of a prebuilt archive holding aggregated host tools
pub const SEED_HOST_TOOLS_DIR: &str = "host-tools";

/// `bin` directory of the host tools shipped inside a prebuilt archive
pub fn prebuilt_host_bin_dir(archive_dir: &Path) -> PathBuf {
    archive_dir.join(SEED_HOST_TOOLS_DIR).join("bin")
}

/// Which resolution strategy produced a toolchain record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainOrigin {
    /// Ambient host tools
    Host,
    /// Ambient cross tools with a dependency-supplied sysroot
    Cross,
    /// Outputs of a bootstrap stage
    Bootstrap,
    /// An unpacked prebuilt archive
    Prebuilt,
}

impl ToolchainOrigin {
    /// Get a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Cross => "cross",
            Self::Bootstrap => "bootstrap",
            Self::Prebuilt => "prebuilt",
        }
    }
}

impl fmt::Display for ToolchainOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Install prefix emitted by any package node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstallPrefix {
    pub prefix_path: PathBuf,
}

impl InstallPrefix {
    pub fn new(prefix_path: impl Into<PathBuf>) -> Self {
        Self {
            prefix_path: prefix_path.into(),
        }
    }
}

/// Raw outputs of one bootstrap stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapStageInfo {
    pub cc_artifact: PathBuf,
    pub cxx_artifact: PathBuf,
    pub ar_artifact: PathBuf,
    pub sysroot_artifact: PathBuf,
    pub target_triple: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
}

impl BootstrapStageInfo {
    /// Stage outputs laid out under `out_dir`
    ///
    /// Cross stages prefix tool names with the triple; native stages use
    /// bare names. The sysroot lives in `out_dir/sysroot`.
    pub fn in_dir(
        out_dir: &Path,
        target_triple: &str,
        native: bool,
        interpreter: Option<&str>,
    ) -> Self {
        let bin = out_dir.join("bin");
        let tool = |name: &str| {
            if native {
                bin.join(name)
            } else {
                bin.join(format!("{}-{}", target_triple, name))
            }
        };
        Self {
            cc_artifact: tool("gcc"),
            cxx_artifact: tool("g++"),
            ar_artifact: tool("ar"),
            sysroot_artifact: out_dir.join("sysroot"),
            target_triple: target_triple.to_string(),
            interpreter: interpreter.map(|rel| out_dir.join(rel)),
        }
    }

    /// Stage record describing an already resolved toolchain
    ///
    /// Only toolchains with a sysroot can stand in for a stage.
    pub fn from_toolchain(tc: &ToolchainInfo) -> Option<Self> {
        Some(Self {
            cc_artifact: tc.cc.clone(),
            cxx_artifact: tc.cxx.clone(),
            ar_artifact: tc.ar.clone(),
            sysroot_artifact: tc.sysroot.clone()?,
            target_triple: tc.target_triple.clone(),
            interpreter: tc.interpreter.clone(),
        })
    }

    /// Every artifact path this record promises
    pub fn artifacts(&self) -> Vec<&Path> {
        let mut paths = vec![
            self.cc_artifact.as_path(),
            self.cxx_artifact.as_path(),
            self.ar_artifact.as_path(),
            self.sysroot_artifact.as_path(),
        ];
        if let Some(ref interp) = self.interpreter {
            paths.push(interp.as_path());
        }
        paths
    }

    /// First promised artifact that does not exist on disk
    pub fn first_missing(&self) -> Option<PathBuf> {
        self.artifacts()
            .into_iter()
            .find(|p| !p.exists())
            .map(Path::to_path_buf)
    }
}

/// A normalized toolchain capability record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainInfo {
    pub origin: ToolchainOrigin,
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub strip: PathBuf,
    pub make: PathBuf,
    pub pkg_config: PathBuf,
    pub target_triple: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sysroot: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
}

/// The four ways of resolving a toolchain record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainSource {
    /// Ambient host commands, no sysroot
    Host { target_triple: String },
    /// Ambient cross commands plus a sysroot from a dependency
    Cross {
        target_triple: String,
        sysroot: InstallPrefix,
    },
    /// Bridge from a bootstrap stage's raw outputs
    Bootstrap {
        stage: BootstrapStageInfo,
        host_bin_dir: Option<PathBuf>,
    },
    /// Fixed layout inside an unpacked archive directory
    Prebuilt {
        archive_dir: PathBuf,
        target_triple: String,
        host_bin_dir: Option<PathBuf>,
        interpreter: Option<String>,
    },
}

impl ToolchainSource {
    /// Produce the capability record for this source
    pub fn resolve(&self) -> ToolchainInfo {
        match self {
            Self::Host { target_triple } => ToolchainInfo::host(target_triple),
            Self::Cross {
                target_triple,
                sysroot,
            } => ToolchainInfo::cross(target_triple, sysroot),
            Self::Bootstrap {
                stage,
                host_bin_dir,
            } => ToolchainInfo::bootstrap(stage, host_bin_dir.as_deref()),
            Self::Prebuilt {
                archive_dir,
                target_triple,
                host_bin_dir,
                interpreter,
            } => ToolchainInfo::prebuilt(
                archive_dir,
                target_triple,
                host_bin_dir.as_deref(),
                interpreter.as_deref(),
            ),
        }
    }
}

/// Tools not covered by a stage or archive come from the aggregated host
/// tools directory when one is known, otherwise by bare name.
fn aux_tool(host_bin_dir: Option<&Path>, name: &str) -> PathBuf {
    match host_bin_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

impl ToolchainInfo {
    /// Host variant: bare ambient command names
    pub fn host(target_triple: &str) -> Self {
        Self {
            origin: ToolchainOrigin::Host,
            cc: PathBuf::from("cc"),
            cxx: PathBuf::from("c++"),
            ar: PathBuf::from("ar"),
            strip: PathBuf::from("strip"),
            make: PathBuf::from("make"),
            pkg_config: PathBuf::from("pkg-config"),
            target_triple: target_triple.to_string(),
            sysroot: None,
            interpreter: None,
        }
    }

    /// Cross variant: ambient triple-prefixed commands plus a sysroot
    pub fn cross(target_triple: &str, sysroot: &InstallPrefix) -> Self {
        let prefixed = |name: &str| PathBuf::from(format!("{}-{}", target_triple, name));
        Self {
            origin: ToolchainOrigin::Cross,
            cc: prefixed("gcc"),
            cxx: prefixed("g++"),
            ar: prefixed("ar"),
            strip: prefixed("strip"),
            make: PathBuf::from("make"),
            pkg_config: PathBuf::from("pkg-config"),
            target_triple: target_triple.to_string(),
            sysroot: Some(sysroot.prefix_path.clone()),
            interpreter: None,
        }
    }

    /// Bootstrap variant: bridge a stage record into a toolchain record
    pub fn bootstrap(stage: &BootstrapStageInfo, host_bin_dir: Option<&Path>) -> Self {
        Self {
            origin: ToolchainOrigin::Bootstrap,
            cc: stage.cc_artifact.clone(),
            cxx: stage.cxx_artifact.clone(),
            ar: stage.ar_artifact.clone(),
            strip: sibling_tool(&stage.ar_artifact, "ar", "strip"),
            make: aux_tool(host_bin_dir, "make"),
            pkg_config: aux_tool(host_bin_dir, "pkg-config"),
            target_triple: stage.target_triple.clone(),
            sysroot: Some(stage.sysroot_artifact.clone()),
            interpreter: stage.interpreter.clone(),
        }
    }

    /// Prebuilt variant: project fixed relative paths out of an archive
    pub fn prebuilt(
        archive_dir: &Path,
        target_triple: &str,
        host_bin_dir: Option<&Path>,
        interpreter: Option<&str>,
    ) -> Self {
        let bin = archive_dir.join("tools").join("bin");
        let tool = |name: &str| bin.join(format!("{}-{}", target_triple, name));
        let sysroot = archive_dir
            .join("tools")
            .join(target_triple)
            .join("sys-root");
        Self {
            origin: ToolchainOrigin::Prebuilt,
            cc: tool("gcc"),
            cxx: tool("g++"),
            ar: tool("ar"),
            strip: tool("strip"),
            make: aux_tool(host_bin_dir, "make"),
            pkg_config: aux_tool(host_bin_dir, "pkg-config"),
            target_triple: target_triple.to_string(),
            interpreter: interpreter.map(|rel| sysroot.join(rel)),
            sysroot: Some(sysroot),
        }
    }

    /// The `--sysroot=<path>` flag, if this toolchain has a sysroot
    pub fn sysroot_flag(&self) -> Option<String> {
        self.sysroot
            .as_ref()
            .map(|s| format!("--sysroot={}", s.display()))
    }

    /// Full argv for a C compile or link invocation
    pub fn compile_command(&self, args: &[&str]) -> Vec<String> {
        self.command_for(&self.cc, args)
    }

    /// Full argv for a C++ compile or link invocation
    pub fn cxx_command(&self, args: &[&str]) -> Vec<String> {
        self.command_for(&self.cxx, args)
    }

    fn command_for(&self, tool: &Path, args: &[&str]) -> Vec<String> {
        let mut argv = vec![tool.display().to_string()];
        if let Some(flag) = self.sysroot_flag() {
            argv.push(flag);
        }
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Environment variables for build systems driven by this toolchain
    ///
    /// PATH is deliberately not touched: hermetic builds must not inherit
    /// the ambient search path.
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), self.cc.display().to_string());
        env.insert("CXX".to_string(), self.cxx.display().to_string());
        env.insert("AR".to_string(), self.ar.display().to_string());
        env.insert("STRIP".to_string(), self.strip.display().to_string());
        env.insert("MAKE".to_string(), self.make.display().to_string());
        env.insert(
            "PKG_CONFIG".to_string(),
            self.pkg_config.display().to_string(),
        );
        env.insert("TARGET".to_string(), self.target_triple.clone());

        if let Some(flag) = self.sysroot_flag() {
            env.insert("CFLAGS".to_string(), flag.clone());
            env.insert("CXXFLAGS".to_string(), flag.clone());
            env.insert("LDFLAGS".to_string(), flag);
        }
        if let Some(ref sysroot) = self.sysroot {
            env.insert(
                "PKG_CONFIG_SYSROOT_DIR".to_string(),
                sysroot.display().to_string(),
            );
        }
        env
    }
}

/// Derive a sibling tool path, e.g. `x86_64-...-ar` -> `x86_64-...-strip`
fn sibling_tool(path: &Path, from: &str, to: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sibling = match name.strip_suffix(from) {
        Some(stem) => format!("{}{}", stem, to),
        None => to.to_string(),
    };
    path.with_file_name(sibling)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIPLE: &str = "x86_64-kindling-linux-gnu";

    fn stage1_record() -> BootstrapStageInfo {
        BootstrapStageInfo::in_dir(
            Path::new("/out/stage1"),
            TRIPLE,
            false,
            Some("sysroot/lib64/ld-linux-x86-64.so.2"),
        )
    }

    #[test]
    fn test_host_variant_has_no_sysroot() {
        let tc = ToolchainSource::Host {
            target_triple: TRIPLE.to_string(),
        }
        .resolve();
        assert_eq!(tc.origin, ToolchainOrigin::Host);
        assert_eq!(tc.cc, PathBuf::from("cc"));
        assert!(tc.sysroot.is_none());
        assert_eq!(tc.compile_command(&["-c", "a.c"]), vec!["cc", "-c", "a.c"]);
    }

    #[test]
    fn test_cross_variant_injects_sysroot() {
        let tc = ToolchainInfo::cross(TRIPLE, &InstallPrefix::new("/out/sysroot"));
        assert_eq!(tc.cc, PathBuf::from(format!("{}-gcc", TRIPLE)));
        assert_eq!(
            tc.compile_command(&["-o", "a", "a.c"]),
            vec![
                format!("{}-gcc", TRIPLE),
                "--sysroot=/out/sysroot".to_string(),
                "-o".to_string(),
                "a".to_string(),
                "a.c".to_string(),
            ]
        );
        assert_eq!(
            tc.cxx_command(&[])[1],
            "--sysroot=/out/sysroot".to_string()
        );
    }

    #[test]
    fn test_bootstrap_variant_round_trip() {
        let stage = stage1_record();
        let tc = ToolchainInfo::bootstrap(&stage, None);

        assert_eq!(tc.target_triple, stage.target_triple);
        assert_eq!(tc.sysroot.as_ref(), Some(&stage.sysroot_artifact));
        assert_eq!(tc.cc, stage.cc_artifact);
        assert_eq!(tc.cxx, stage.cxx_artifact);
        assert_eq!(tc.ar, stage.ar_artifact);
        assert_eq!(tc.interpreter, stage.interpreter);
        assert_eq!(
            tc.strip,
            PathBuf::from(format!("/out/stage1/bin/{}-strip", TRIPLE))
        );
    }

    #[test]
    fn test_stage_record_from_prebuilt() {
        let tc = ToolchainInfo::prebuilt(Path::new("/seed"), TRIPLE, None, Some("lib64/ld.so"));
        let stage = BootstrapStageInfo::from_toolchain(&tc).unwrap();
        assert_eq!(stage.cc_artifact, tc.cc);
        assert_eq!(Some(stage.sysroot_artifact), tc.sysroot);
        assert!(BootstrapStageInfo::from_toolchain(&ToolchainInfo::host(TRIPLE)).is_none());
    }

    #[test]
    fn test_bootstrap_variant_uses_host_bin_dir() {
        let stage = BootstrapStageInfo::in_dir(Path::new("/out/stage2"), TRIPLE, true, None);
        let tc = ToolchainInfo::bootstrap(&stage, Some(Path::new("/out/host-tools/bin")));
        assert_eq!(tc.cc, PathBuf::from("/out/stage2/bin/gcc"));
        assert_eq!(tc.strip, PathBuf::from("/out/stage2/bin/strip"));
        assert_eq!(tc.make, PathBuf::from("/out/host-tools/bin/make"));
        assert_eq!(tc.pkg_config, PathBuf::from("/out/host-tools/bin/pkg-config"));
    }

    #[test]
    fn test_prebuilt_variant_layout() {
        let tc = ToolchainInfo::prebuilt(Path::new("/seed"), TRIPLE, None, None);
        assert_eq!(
            tc.cc,
            PathBuf::from(format!("/seed/tools/bin/{}-gcc", TRIPLE))
        );
        assert_eq!(
            tc.strip,
            PathBuf::from(format!("/seed/tools/bin/{}-strip", TRIPLE))
        );
        assert_eq!(
            tc.sysroot,
            Some(PathBuf::from(format!("/seed/tools/{}/sys-root", TRIPLE)))
        );
        assert_eq!(tc.make, PathBuf::from("make"));
    }

    #[test]
    fn test_variants_share_record_shape() {
        let records = [
            ToolchainInfo::host(TRIPLE),
            ToolchainInfo::cross(TRIPLE, &InstallPrefix::new("/s")),
            ToolchainInfo::bootstrap(&stage1_record(), None),
            ToolchainInfo::prebuilt(Path::new("/seed"), TRIPLE, None, None),
        ];
        for tc in &records {
            let env = tc.env();
            for key in ["CC", "CXX", "AR", "STRIP", "MAKE", "PKG_CONFIG", "TARGET"] {
                assert!(env.contains_key(key), "{} missing {}", tc.origin, key);
            }
            assert!(!env.contains_key("PATH"));
            assert_eq!(tc.target_triple, TRIPLE);
        }
    }

    #[test]
    fn test_env_sysroot_flags() {
        let tc = ToolchainInfo::bootstrap(&stage1_record(), None);
        let env = tc.env();
        assert_eq!(
            env.get("CFLAGS").map(String::as_str),
            Some("--sysroot=/out/stage1/sysroot")
        );
        assert_eq!(
            env.get("PKG_CONFIG_SYSROOT_DIR").map(String::as_str),
            Some("/out/stage1/sysroot")
        );

        let host = ToolchainInfo::host(TRIPLE).env();
        assert!(!host.contains_key("CFLAGS"));
    }

    #[test]
    fn test_stage_record_missing_artifacts() {
        let temp = tempfile::tempdir().unwrap();
        let stage = BootstrapStageInfo::in_dir(temp.path(), TRIPLE, false, None);
        assert_eq!(stage.first_missing(), Some(stage.cc_artifact.clone()));

        std::fs::create_dir_all(temp.path().join("bin")).unwrap();
        std::fs::create_dir_all(&stage.sysroot_artifact).unwrap();
        for tool in [&stage.cc_artifact, &stage.cxx_artifact, &stage.ar_artifact] {
            std::fs::write(tool, b"").unwrap();
        }
        assert_eq!(stage.first_missing(), None);
    }
}
