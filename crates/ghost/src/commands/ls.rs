//! List command

use anyhow::Result;
use ghost_lifecycle::InstanceSummary;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

use super::Session;

#[derive(Debug, Tabled)]
struct InstanceRow {
    name: String,
    location: String,
    version: String,
    status: String,
    url: String,
    port: String,
    process: String,
}

impl InstanceRow {
    fn from_summary(name: &str, summary: &InstanceSummary) -> Self {
        let status = if !summary.dir.exists() {
            "missing".to_string()
        } else if summary.running {
            match summary.environment {
                Some(env) => format!("running ({})", env),
                None => "running".to_string(),
            }
        } else {
            "stopped".to_string()
        };

        let or_na = |value: Option<String>| value.unwrap_or_else(|| "n/a".to_string());
        Self {
            name: name.to_string(),
            location: summary.dir.display().to_string(),
            version: or_na(summary.version.clone()),
            status,
            url: or_na(summary.url.clone()),
            port: or_na(summary.port.map(|p| p.to_string())),
            process: or_na(summary.process.clone()),
        }
    }

    fn unreadable(name: &str, location: String) -> Self {
        Self {
            name: name.to_string(),
            location,
            version: "n/a".to_string(),
            status: "unreadable".to_string(),
            url: "n/a".to_string(),
            port: "n/a".to_string(),
            process: "n/a".to_string(),
        }
    }
}

pub async fn run(session: &Session) -> Result<()> {
    let entries = session.system.instances()?;
    if entries.is_empty() {
        session.ui().info("No installed ghost instances found");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut instance = session.system.get_instance(&entry.dir);
        match instance.summary().await {
            Ok(summary) => rows.push(InstanceRow::from_summary(&entry.name, &summary)),
            Err(e) => {
                warn!("Could not read '{}': {}", entry.name, e);
                rows.push(InstanceRow::unreadable(
                    &entry.name,
                    entry.dir.display().to_string(),
                ));
            }
        }
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghost_core::Environment;
    use std::path::PathBuf;

    fn summary(dir: PathBuf, running: bool) -> InstanceSummary {
        InstanceSummary {
            name: "blog".to_string(),
            dir,
            version: Some("5.80.0".to_string()),
            running,
            environment: running.then_some(Environment::Production),
            url: Some("https://blog.example.com".to_string()),
            port: Some(2368),
            process: Some("systemd".to_string()),
        }
    }

    #[test]
    fn test_row_for_running_instance() {
        let dir = tempfile::tempdir().unwrap();
        let row = InstanceRow::from_summary("blog-example-com", &summary(dir.path().into(), true));
        assert_eq!(row.name, "blog-example-com");
        assert_eq!(row.status, "running (production)");
        assert_eq!(row.port, "2368");
        assert_eq!(row.version, "5.80.0");
    }

    #[test]
    fn test_row_for_vanished_directory() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let mut bare = summary(gone, false);
        bare.version = None;
        let row = InstanceRow::from_summary("gone", &bare);
        assert_eq!(row.status, "missing");
        assert_eq!(row.version, "n/a");
    }

    #[test]
    fn test_row_for_stopped_instance() {
        let dir = tempfile::tempdir().unwrap();
        let row = InstanceRow::from_summary("blog", &summary(dir.path().into(), false));
        assert_eq!(row.status, "stopped");
    }
}
