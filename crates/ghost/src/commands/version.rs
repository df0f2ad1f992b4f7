//! Version command

use anyhow::Result;

use super::Session;
use crate::cli::VersionArgs;
use crate::version::VersionInfo;

pub fn run(session: &Session, args: VersionArgs) -> Result<()> {
    let mut info = VersionInfo::current();
    let instance = session.system.get_instance(&session.dir);
    if instance.cli_config().exists() {
        info.ghost = instance.version()?.map(|v| v.to_string());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.display());
    if let Some(ghost) = &info.ghost {
        println!("Ghost version: {} (at {})", ghost, session.dir.display());
    }
    if let Some(date) = &info.build_date {
        println!("Build date: {}", date);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info_current_is_valid_semver() {
        let info = VersionInfo::current();
        assert!(semver::Version::parse(&info.version).is_ok());
        assert!(info.ghost.is_none());
    }

    #[test]
    fn test_version_info_display() {
        let info = VersionInfo {
            version: "1.4.0".to_string(),
            commit: Some("abc1234".to_string()),
            build_date: None,
            ghost: None,
        };
        assert_eq!(info.display(), "Ghost-CLI version: 1.4.0 (abc1234)");
        assert_eq!(format!("{}", info), info.display());
    }

    #[test]
    fn test_version_info_display_without_commit() {
        let info = VersionInfo {
            version: "1.4.0".to_string(),
            commit: None,
            build_date: None,
            ghost: Some("5.80.0".to_string()),
        };
        assert_eq!(info.display(), "Ghost-CLI version: 1.4.0");
    }
}
