//! Release resolution, download and on-disk layout
//!
//! Releases come from an npm-style registry document or from a local
//! `.tar.gz` archive. Either way the tarball's leading directory is stripped
//! and the contents land in `versions/<version>`.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use ghost_core::paths::{version_dir, CURRENT_LINK, VERSIONS_DIR};
use ghost_core::utils::{command_exists, run_command};
use ghost_core::{Error, Result, CLI_VERSION};
use semver::Version;
use serde_json::Value;
use tracing::{debug, info};

/// Registry document for the application package
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/ghost";

/// Environment variable overriding [`DEFAULT_REGISTRY`]
pub const REGISTRY_ENV: &str = "GHOST_RELEASE_REGISTRY";

/// Number of extracted releases kept after an update
pub const KEEP_VERSIONS: usize = 5;

/// A resolved release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub version: Version,
    /// Download location, absent for local archives
    pub tarball: Option<String>,
    /// Runtime range from the package's `engines.node`
    pub engines: Option<String>,
}

/// Where releases come from
#[derive(Debug, Clone)]
pub enum ReleaseSource {
    Registry { url: String },
    Archive(PathBuf),
}

impl ReleaseSource {
    /// The registry, honouring [`REGISTRY_ENV`]
    pub fn registry() -> Self {
        let url = std::env::var(REGISTRY_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string());
        Self::Registry { url }
    }

    pub fn archive(path: impl Into<PathBuf>) -> Self {
        Self::Archive(path.into())
    }

    /// Resolve `requested` (or the latest release) to a concrete version
    pub async fn resolve(&self, requested: Option<&str>) -> Result<Release> {
        let requested = requested.map(parse_version).transpose()?;
        match self {
            Self::Registry { url } => {
                let document = fetch_json(url).await?;
                resolve_from_document(&document, requested.as_ref())
            }
            Self::Archive(path) => {
                let path = path.clone();
                let package = tokio::task::spawn_blocking(move || archive_package_json(&path))
                    .await
                    .map_err(|e| Error::cli(format!("Archive inspection failed: {}", e)))??;
                let version = package
                    .get("version")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::cli("Archive package.json has no version"))
                    .and_then(parse_version)?;

                if let Some(requested) = requested {
                    if requested != version {
                        return Err(Error::cli(format!(
                            "Archive contains version {}, not {}",
                            version, requested
                        )));
                    }
                }
                Ok(Release {
                    engines: engines_of(&package),
                    version,
                    tarball: None,
                })
            }
        }
    }

    /// Download (if needed) and extract `release` into `dest`
    pub async fn fetch(&self, release: &Release, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        let dest = dest.to_path_buf();

        match self {
            Self::Registry { .. } => {
                let url = release.tarball.clone().ok_or_else(|| {
                    Error::cli(format!("Release {} has no tarball", release.version))
                })?;
                info!("Downloading {}", url);
                let bytes = client()?
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| download_error(&url, e))?
                    .bytes()
                    .await
                    .map_err(|e| download_error(&url, e))?;

                tokio::task::spawn_blocking(move || extract(bytes.as_ref(), &dest))
                    .await
                    .map_err(|e| Error::cli(format!("Extraction failed: {}", e)))?
            }
            Self::Archive(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || {
                    let file = std::fs::File::open(&path)?;
                    extract(file, &dest)
                })
                .await
                .map_err(|e| Error::cli(format!("Extraction failed: {}", e)))?
            }
        }
    }
}

fn parse_version(raw: &str) -> Result<Version> {
    Version::parse(raw.trim().trim_start_matches('v'))
        .map_err(|e| Error::cli(format!("Invalid version '{}': {}", raw, e)))
}

fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("ghost-cli/{}", CLI_VERSION))
        .build()
        .map_err(|e| Error::system(format!("Failed to create HTTP client: {}", e)))
}

fn download_error(url: &str, err: reqwest::Error) -> Error {
    Error::system(format!("Failed to download {}: {}", url, err))
        .with_help("Check your network connection or pass --archive")
}

async fn fetch_json(url: &str) -> Result<Value> {
    debug!("Fetching release metadata from {}", url);
    client()?
        .get(url)
        .header("Accept", "application/json")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| download_error(url, e))?
        .json::<Value>()
        .await
        .map_err(|e| Error::cli(format!("Invalid release metadata from {}: {}", url, e)))
}

fn engines_of(package: &Value) -> Option<String> {
    package
        .pointer("/engines/node")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Pick a release out of an npm-style package document
pub fn resolve_from_document(document: &Value, requested: Option<&Version>) -> Result<Release> {
    let version = match requested {
        Some(version) => version.clone(),
        None => document
            .pointer("/dist-tags/latest")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::cli("Release metadata has no latest version"))
            .and_then(parse_version)?,
    };

    let entry = document
        .get("versions")
        .and_then(|v| v.get(version.to_string()))
        .ok_or_else(|| Error::cli(format!("Version {} does not exist", version)))?;

    Ok(Release {
        tarball: entry
            .pointer("/dist/tarball")
            .and_then(Value::as_str)
            .map(str::to_string),
        engines: engines_of(entry),
        version,
    })
}

/// Read the top-level `package.json` out of a release archive
fn archive_package_json(path: &Path) -> Result<Value> {
    let file = std::fs::File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if entry_path.components().count() == 2 && entry_path.ends_with("package.json") {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            return serde_json::from_str(&content).map_err(|source| Error::JsonParse {
                path: format!("{}:package.json", path.display()),
                source,
            });
        }
    }
    Err(Error::cli(format!(
        "{} does not look like a Ghost release (no package.json)",
        path.display()
    )))
}

/// Extract a gzipped tarball into `dest`, dropping the leading directory
pub fn extract<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut count = 0usize;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        let mut components = path.components();
        components.next();
        let stripped: PathBuf = components.as_path().to_path_buf();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        if stripped
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::cli(format!(
                "Refusing to extract unsafe path {}",
                path.display()
            )));
        }

        let target = dest.join(&stripped);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        count += 1;
    }

    debug!("Extracted {} entries into {:?}", count, dest);
    Ok(())
}

/// Point `current` at `versions/<version>`
pub fn link_current(dir: &Path, version: &Version) -> Result<()> {
    let target = version_dir(dir, &version.to_string());
    if !target.is_dir() {
        return Err(Error::cli(format!(
            "Version {} is not installed in {}",
            version,
            dir.display()
        )));
    }

    let link = dir.join(CURRENT_LINK);
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(&link)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, &link)?;
    #[cfg(windows)]
    std::os::windows::fs::symlink_dir(&target, &link)?;

    debug!("Linked {:?} -> {:?}", link, target);
    Ok(())
}

/// Installed release versions, newest first
pub fn installed_versions(dir: &Path) -> Result<Vec<Version>> {
    let versions_dir = dir.join(VERSIONS_DIR);
    if !versions_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut versions: Vec<Version> = std::fs::read_dir(&versions_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| Version::parse(&entry.file_name().to_string_lossy()).ok())
        .collect();
    versions.sort_by(|a, b| b.cmp(a));
    Ok(versions)
}

/// Remove all but the newest `keep` releases, never touching `protect`
pub fn prune_versions(dir: &Path, keep: usize, protect: &[Version]) -> Result<Vec<Version>> {
    let mut removed = Vec::new();
    for version in installed_versions(dir)?.into_iter().skip(keep) {
        if protect.contains(&version) {
            continue;
        }
        std::fs::remove_dir_all(version_dir(dir, &version.to_string()))?;
        removed.push(version);
    }
    if !removed.is_empty() {
        info!("Removed {} old release(s)", removed.len());
    }
    Ok(removed)
}

/// Install production dependencies of an extracted release
pub async fn install_dependencies(release_dir: &Path) -> Result<()> {
    if command_exists("yarn") {
        run_command(
            "yarn",
            &["install", "--production", "--no-emoji", "--no-progress"],
            Some(release_dir),
        )
        .await?;
    } else if command_exists("npm") {
        run_command("npm", &["install", "--omit=dev", "--no-audit"], Some(release_dir)).await?;
    } else {
        return Err(Error::system("Neither yarn nor npm was found")
            .with_help("Install Node.js with npm, or pass --no-deps"));
    }
    Ok(())
}
