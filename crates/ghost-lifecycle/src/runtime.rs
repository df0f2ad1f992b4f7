//! The Node.js runtime the application runs on

use ghost_core::utils::{command_exists, command_stdout};
use ghost_core::{Error, Result};
use semver::{Version, VersionReq};

/// Runtime lines the CLI supports
pub const SUPPORTED: &[&str] = &["^18.12.1", "^20.11.1", "^22.13.1"];

/// Version of the `node` binary on PATH
pub async fn node_version() -> Result<Version> {
    if !command_exists("node") {
        return Err(Error::system("Node.js is not installed")
            .with_help("Install a supported version from https://nodejs.org"));
    }
    let raw = command_stdout("node", &["--version"]).await?;
    parse_node_version(&raw)
}

/// Parse `node --version` output such as `v20.11.1`
pub fn parse_node_version(raw: &str) -> Result<Version> {
    let raw = raw.trim();
    Version::parse(raw.trim_start_matches('v'))
        .map_err(|e| Error::system(format!("Unrecognised Node.js version '{}': {}", raw, e)))
}

/// Whether `version` satisfies one of `ranges` (npm-style `a || b` allowed)
pub fn satisfies(version: &Version, ranges: &[&str]) -> bool {
    ranges
        .iter()
        .flat_map(|range| range.split("||"))
        .filter_map(|range| VersionReq::parse(range.trim()).ok())
        .any(|req| req.matches(version))
}

/// Fail with a system error unless `version` is supported
pub fn check_supported(version: &Version, engines: Option<&str>) -> Result<()> {
    let supported = match engines {
        Some(engines) => satisfies(version, &[engines]),
        None => satisfies(version, SUPPORTED),
    };
    if supported {
        return Ok(());
    }

    let wanted = engines
        .map(str::to_string)
        .unwrap_or_else(|| SUPPORTED.join(", "));
    Err(Error::system(format!("Node.js v{} is not supported", version))
        .with_help(format!("Supported versions: {}", wanted)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_check() {
        let v = parse_node_version("v20.11.1\n").unwrap();
        assert_eq!(v, Version::new(20, 11, 1));
        assert!(check_supported(&v, None).is_ok());
        assert!(check_supported(&Version::new(16, 0, 0), None).is_err());
    }

    #[test]
    fn test_engines_ranges() {
        let v = Version::new(18, 20, 0);
        assert!(satisfies(&v, &["^18.12.1 || ^20.11.1"]));
        assert!(check_supported(&v, Some("^20.11.1")).is_err());
    }
}
