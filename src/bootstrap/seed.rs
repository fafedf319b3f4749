// src/bootstrap/seed.rs

//! Seed toolchain sources and archives
//!
//! The seed is the only toolchain that enters the bootstrap from outside.
//! It comes from exactly one of three places, chosen once by precedence:
//!
//! 1. a URL (`[seed] url`, fetched by the external engine)
//! 2. a local archive path (`[seed] path`)
//! 3. a from-source build of a minimal cross toolchain
//!
//! Seed archives are compressed tarballs holding the prebuilt layout
//! (`tools/bin/<triple>-gcc`, `tools/<triple>/sys-root/`) plus a top-level
//! `metadata.json`, and optionally an aggregated host tools tree under
//! `host-tools/`. The metadata records a content hash over the toolchain
//! entries and, separately, over the host tools; both are checked before
//! the unpacked tree is moved into place.

use crate::error::{ConfigError, Error, Result};
use crate::toolchain::{prebuilt_host_bin_dir, SEED_HOST_TOOLS_DIR};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Target fetching the seed archive from a URL
pub const SEED_FETCH: &str = "//seed:fetch";
/// Target wrapping a locally supplied seed archive
pub const SEED_LOCAL: &str = "//seed:local";
/// Target building the seed from source
pub const SEED_FROM_SOURCE: &str = "//seed:from-source";
/// Target exposing the seed as a toolchain
pub const SEED_TOOLCHAIN: &str = "//seed:toolchain";

/// Name of the metadata file at the root of a seed archive
pub const METADATA_FILE: &str = "metadata.json";

/// Current metadata format version
pub const METADATA_FORMAT_VERSION: u32 = 1;

/// `[seed]` table of the bootstrap configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Expected SHA-256 of the archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Signature reference for the archive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Explicitly request a from-source seed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_source: Option<bool>,
    /// The seed archive carries aggregated host tools under `host-tools/`
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub host_tools: bool,
}

/// Where the seed toolchain comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedSource {
    Url {
        url: String,
        checksum: Option<String>,
        signature: Option<String>,
    },
    Path {
        path: PathBuf,
        checksum: Option<String>,
    },
    FromSource,
}

impl SeedSource {
    /// Apply the URL > path > from-source precedence
    ///
    /// Asking for a from-source seed while also naming an archive is
    /// ambiguous and rejected rather than silently resolved.
    pub fn select(config: &SeedConfig) -> std::result::Result<Self, ConfigError> {
        match (config.from_source, &config.url, &config.path) {
            (Some(true), Some(_), _) | (Some(true), _, Some(_)) => Err(ConfigError::SeedConflict(
                "from_source = true conflicts with a seed url or path".to_string(),
            )),
            (_, Some(url), _) => Ok(Self::Url {
                url: url.clone(),
                checksum: config.checksum.clone(),
                signature: config.signature.clone(),
            }),
            (_, None, Some(path)) => Ok(Self::Path {
                path: path.clone(),
                checksum: config.checksum.clone(),
            }),
            (Some(false), None, None) => Err(ConfigError::SeedConflict(
                "from_source = false but no seed url or path given".to_string(),
            )),
            (_, None, None) if config.host_tools => Err(ConfigError::SeedConflict(
                "host_tools needs a seed archive url or path".to_string(),
            )),
            (_, None, None) => Ok(Self::FromSource),
        }
    }

    /// Label of the target producing the seed archive
    pub fn archive_label(&self) -> &'static str {
        match self {
            Self::Url { .. } => SEED_FETCH,
            Self::Path { .. } => SEED_LOCAL,
            Self::FromSource => SEED_FROM_SOURCE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Url { .. } => "url",
            Self::Path { .. } => "path",
            Self::FromSource => "from-source",
        }
    }
}

/// Contents of `metadata.json` in a seed archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMetadata {
    pub format_version: u32,
    pub target_triple: String,
    pub gcc_version: String,
    pub glibc_version: String,
    pub contents_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_host_tools: bool,
    /// Hash of the `host-tools/` tree, which `contents_sha256` leaves out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_tools_sha256: Option<String>,
}

/// Archive compression, detected from the file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zstd,
    Xz,
    Gzip,
}

impl Compression {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".tar.zst") || name.ends_with(".tar.zstd") {
            Some(Self::Zstd)
        } else if name.ends_with(".tar.xz") {
            Some(Self::Xz)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }

    fn decoder(&self, file: File) -> io::Result<Box<dyn Read>> {
        Ok(match self {
            Self::Zstd => Box::new(zstd::Decoder::new(file)?),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(file)),
            Self::Gzip => Box::new(flate2::read::GzDecoder::new(file)),
        })
    }
}

fn compression_of(archive: &Path) -> Result<Compression> {
    Compression::from_path(archive).ok_or_else(|| {
        Error::Archive(format!(
            "unsupported archive extension: {} (want .tar.zst, .tar.xz or .tar.gz)",
            archive.display()
        ))
    })
}

/// SHA-256 over the toolchain part of an unpacked seed
///
/// Covers everything except a top-level `metadata.json` and the
/// `host-tools/` tree, which is hashed on its own by [`tree_sha256`].
pub fn contents_sha256(dir: &Path) -> Result<String> {
    hash_tree(dir, &[METADATA_FILE, SEED_HOST_TOOLS_DIR])
}

/// SHA-256 over a whole directory tree
pub fn tree_sha256(dir: &Path) -> Result<String> {
    hash_tree(dir, &[])
}

/// Directories are visited in order of their relative path string, so a
/// directory's own files come before anything below it. Within one
/// directory, non-directory entries are taken in name order; each adds
/// its relative path followed by its bytes (files) or link target
/// (symlinks). Symlinks to directories are neither followed nor hashed.
fn hash_tree(dir: &Path, skip_top: &[&str]) -> Result<String> {
    let mut dirs = Vec::new();
    let walker = WalkDir::new(dir).follow_links(false).into_iter().filter_entry(|e| {
        e.depth() != 1 || !skip_top.iter().any(|s| e.file_name() == *s)
    });
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(relative_to(entry.path(), dir)?);
        }
    }
    dirs.sort_by(|a, b| a.as_os_str().as_bytes().cmp(b.as_os_str().as_bytes()));

    let mut hasher = Sha256::new();
    for rel_dir in &dirs {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir.join(rel_dir))? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() || (file_type.is_symlink() && entry.path().is_dir()) {
                continue;
            }
            let name = entry.file_name();
            if rel_dir.as_os_str().is_empty() && skip_top.iter().any(|s| name == *s) {
                continue;
            }
            names.push((name, file_type));
        }
        names.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        for (name, file_type) in names {
            let rel = rel_dir.join(&name);
            let path = dir.join(&rel);
            hasher.update(rel.as_os_str().as_bytes());
            if file_type.is_symlink() {
                hasher.update(fs::read_link(&path)?.as_os_str().as_bytes());
            } else if file_type.is_file() {
                io::copy(&mut File::open(&path)?, &mut hasher)?;
            }
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

fn relative_to(path: &Path, root: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|e| Error::Archive(e.to_string()))
}

/// The aggregated host tools `bin` directory of an unpacked seed, if any
pub fn seed_host_bin_dir(dir: &Path) -> Option<PathBuf> {
    let bin = prebuilt_host_bin_dir(dir);
    bin.is_dir().then_some(bin)
}

/// SHA-256 of a single file
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Read `metadata.json` out of an archive without unpacking it
pub fn read_metadata(archive: &Path) -> Result<SeedMetadata> {
    let compression = compression_of(archive)?;
    let reader = compression.decoder(File::open(archive)?)?;
    let mut tar = tar::Archive::new(reader);

    for entry in tar.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let normalized = path.strip_prefix(".").unwrap_or(&path);
        if normalized == Path::new(METADATA_FILE) {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return Ok(serde_json::from_str(&content)?);
        }
    }
    Err(Error::Archive(format!(
        "no {} in {}",
        METADATA_FILE,
        archive.display()
    )))
}

/// Unpack a seed archive into `output`
///
/// Extraction happens in a sibling temporary directory that is renamed
/// into place only after metadata parsing and (optionally) content
/// verification succeed. On any failure `output` is left untouched.
pub fn unpack_archive(archive: &Path, output: &Path, verify: bool) -> Result<SeedMetadata> {
    let compression = compression_of(archive)?;
    if output.exists() {
        return Err(Error::OutputExists(output.to_path_buf()));
    }
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    info!("Extracting {} -> {}", archive.display(), output.display());
    let staging = tempfile::Builder::new()
        .prefix(".kindling-seed-")
        .tempdir_in(parent)?;

    let reader = compression.decoder(File::open(archive)?)?;
    let mut tar = tar::Archive::new(reader);
    tar.set_preserve_permissions(true);
    tar.unpack(staging.path())?;

    let meta_path = staging.path().join(METADATA_FILE);
    if !meta_path.exists() {
        return Err(Error::Archive(format!(
            "no {} in {}",
            METADATA_FILE,
            archive.display()
        )));
    }
    let metadata: SeedMetadata = serde_json::from_str(&fs::read_to_string(&meta_path)?)?;
    debug!(
        "Seed {} (gcc {}, glibc {})",
        metadata.target_triple, metadata.gcc_version, metadata.glibc_version
    );

    if verify {
        verify_unpacked(staging.path(), &metadata)?;
        info!("Seed contents verified");
    }

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, output) {
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }
    Ok(metadata)
}

fn verify_unpacked(dir: &Path, metadata: &SeedMetadata) -> Result<()> {
    let actual = contents_sha256(dir)?;
    if actual != metadata.contents_sha256 {
        return Err(Error::SeedVerification {
            expected: metadata.contents_sha256.clone(),
            actual,
        });
    }

    let host_tools = dir.join(SEED_HOST_TOOLS_DIR);
    if metadata.has_host_tools && !host_tools.is_dir() {
        return Err(Error::Archive(format!(
            "metadata says has_host_tools but there is no {}/",
            SEED_HOST_TOOLS_DIR
        )));
    }
    if let Some(ref expected) = metadata.host_tools_sha256 {
        let actual = tree_sha256(&host_tools)?;
        if actual != *expected {
            return Err(Error::SeedVerification {
                expected: expected.clone(),
                actual,
            });
        }
    }
    Ok(())
}

/// Pack a toolchain directory into a seed archive
///
/// `host_tools`, or failing that a `host-tools/` directory inside `src`,
/// is stored under `host-tools/`. The content hashes and
/// `has_host_tools` in `metadata` are overwritten.
pub fn pack_archive(
    src: &Path,
    output: &Path,
    mut metadata: SeedMetadata,
    host_tools: Option<&Path>,
) -> Result<SeedMetadata> {
    let compression = compression_of(output)?;
    let embedded = src.join(SEED_HOST_TOOLS_DIR);
    let host_tools = match host_tools {
        Some(dir) if embedded.exists() => {
            return Err(Error::Archive(format!(
                "{} already has {}/, refusing to add {}",
                src.display(),
                SEED_HOST_TOOLS_DIR,
                dir.display()
            )));
        }
        Some(dir) if !dir.is_dir() => {
            return Err(Error::Archive(format!(
                "host tools directory not found: {}",
                dir.display()
            )));
        }
        Some(dir) => Some(dir.to_path_buf()),
        None => embedded.is_dir().then_some(embedded),
    };

    metadata.contents_sha256 = contents_sha256(src)?;
    metadata.has_host_tools = host_tools.is_some();
    metadata.host_tools_sha256 = host_tools.as_deref().map(tree_sha256).transpose()?;
    let meta_json = serde_json::to_vec_pretty(&metadata)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(output)?;
    match compression {
        Compression::Zstd => {
            let encoder = zstd::Encoder::new(file, 19)?;
            write_tar(encoder, src, &meta_json, host_tools.as_deref())?.finish()?;
        }
        Compression::Xz => {
            let encoder = xz2::write::XzEncoder::new(file, 6);
            write_tar(encoder, src, &meta_json, host_tools.as_deref())?.finish()?;
        }
        Compression::Gzip => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            write_tar(encoder, src, &meta_json, host_tools.as_deref())?.finish()?;
        }
    }
    info!("Packed {} -> {}", src.display(), output.display());
    Ok(metadata)
}

fn write_tar<W: Write>(
    writer: W,
    src: &Path,
    meta_json: &[u8],
    host_tools: Option<&Path>,
) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(meta_json.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, METADATA_FILE, meta_json)?;

    append_tree(&mut builder, src, Path::new(""), &[METADATA_FILE, SEED_HOST_TOOLS_DIR])?;
    if let Some(dir) = host_tools {
        builder.append_dir(SEED_HOST_TOOLS_DIR, dir)?;
        append_tree(&mut builder, dir, Path::new(SEED_HOST_TOOLS_DIR), &[])?;
    }
    builder.into_inner()
}

fn append_tree<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    under: &Path,
    skip_top: &[&str],
) -> io::Result<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || !skip_top.iter().any(|s| e.file_name() == *s));
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry.path().strip_prefix(root).map_err(io::Error::other)?;
        builder.append_path_with_name(entry.path(), under.join(rel))?;
    }
    Ok(())
}
