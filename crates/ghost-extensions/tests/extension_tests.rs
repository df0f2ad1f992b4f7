//! Integration tests for the built-in extensions

mod common;

use common::{instance_with_config, setup_context, system, touch, DryRunUi};
use ghost_core::config::keys;
use ghost_extensions::mysql::{Credentials, MYSQL_VALUES};
use ghost_extensions::nginx::site_file;
use ghost_extensions::systemd::unit_file;
use ghost_extensions::{builtin, MysqlExtension, NginxExtension, NginxPaths, SystemdExtension};
use ghost_lifecycle::setup::setup_runner;
use ghost_lifecycle::{Extension, ExtensionRegistry, SetupArgs, SetupContext};
use ghost_tasks::{SkipDecision, Step, TaskRunner};
use serde_json::json;
use tempfile::TempDir;

fn step(steps: Vec<Step<SetupContext>>, id: &str) -> Step<SetupContext> {
    steps
        .into_iter()
        .find(|s| s.id() == id)
        .unwrap_or_else(|| panic!("no step '{}'", id))
}

fn production_args() -> SetupArgs {
    SetupArgs::default()
}

fn local_args() -> SetupArgs {
    SetupArgs {
        local: true,
        ..SetupArgs::default()
    }
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_extension_steps_follow_builtins() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), builtin(), DryRunUi::new());
    let runner = setup_runner(&system, &production_args()).unwrap();
    assert_eq!(
        runner.ids(),
        [
            "config",
            "instance",
            "linux-user",
            "migrate",
            "start",
            "mysql",
            "mysql-config",
            "nginx",
            "ssl",
            "systemd",
        ]
    );
}

#[test]
fn test_systemd_manager_is_registered() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), builtin(), DryRunUi::new());
    assert!(system.process_managers().contains("systemd"));
    assert!(system.process_managers().contains("local"));
}

// ============================================================================
// mysql
// ============================================================================

fn mysql_config(user: &str, host: &str) -> serde_json::Value {
    json!({
        "url": "https://blog.example.com",
        "database": {
            "client": "mysql",
            "connection": {
                "host": host,
                "user": user,
                "password": "rootpass",
                "database": "blog_example_com_prod"
            }
        }
    })
}

#[test]
fn test_mysql_step_only_for_local_root() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let mysql = step(MysqlExtension.setup().unwrap(), "mysql");

    let instance = instance_with_config(&system, temp.path(), mysql_config("root", "localhost"));
    let ctx = setup_context(&system, instance, production_args());
    assert!(mysql.is_enabled(&ctx));

    let instance = instance_with_config(&system, temp.path(), mysql_config("root", "localhost"));
    let ctx = setup_context(&system, instance, local_args());
    assert!(!mysql.is_enabled(&ctx));

    let instance = instance_with_config(&system, temp.path(), mysql_config("ghost", "localhost"));
    let ctx = setup_context(&system, instance, production_args());
    assert!(!mysql.is_enabled(&ctx));

    let instance =
        instance_with_config(&system, temp.path(), mysql_config("root", "db.example.com"));
    let ctx = setup_context(&system, instance, production_args());
    assert!(!mysql.is_enabled(&ctx));
}

#[tokio::test]
async fn test_mysql_config_persists_generated_credentials() {
    let temp = TempDir::new().unwrap();
    let ui = DryRunUi::new();
    let system = system(temp.path(), ExtensionRegistry::new(), ui.clone());
    let instance = instance_with_config(&system, temp.path(), mysql_config("root", "localhost"));
    let mut ctx = setup_context(&system, instance, production_args());

    let credentials = Credentials {
        username: "ghost-0042".to_string(),
        password: "generated".to_string(),
    };
    ctx.values.insert(
        MYSQL_VALUES.to_string(),
        serde_json::to_value(&credentials).unwrap(),
    );

    let mut runner = TaskRunner::new();
    runner
        .push(step(MysqlExtension.setup().unwrap(), "mysql-config"))
        .unwrap();
    let report = runner.run(&mut ctx, ui.as_ref()).await.unwrap();
    assert_eq!(report.completed(), ["mysql-config"]);

    let saved = ghost_core::ConfigStore::new(
        ghost_core::Environment::Production.config_path(ctx.instance.dir()),
    );
    assert_eq!(
        saved.get_string(keys::DATABASE_USER).unwrap().as_deref(),
        Some("ghost-0042")
    );
    assert_eq!(
        saved.get_string(keys::DATABASE_PASSWORD).unwrap().as_deref(),
        Some("generated")
    );
}

#[test]
fn test_mysql_config_waits_for_credentials() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let instance = instance_with_config(&system, temp.path(), mysql_config("root", "localhost"));
    let ctx = setup_context(&system, instance, production_args());

    let config_step = step(MysqlExtension.setup().unwrap(), "mysql-config");
    assert!(!config_step.is_enabled(&ctx));
}

// ============================================================================
// nginx
// ============================================================================

fn nginx(temp: &TempDir) -> NginxExtension {
    NginxExtension::new(NginxPaths {
        root: temp.path().join("nginx"),
        acme_home: temp.path().join("letsencrypt"),
    })
}

#[test]
fn test_nginx_enabled_for_public_urls_only() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let steps = nginx(&temp).setup().unwrap();
    let site = &steps[0];
    let ssl = &steps[1];

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "https://blog.example.com" }));
    let ctx = setup_context(&system, instance, production_args());
    assert!(site.is_enabled(&ctx));
    assert!(ssl.is_enabled(&ctx));

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "http://blog.example.com" }));
    let ctx = setup_context(&system, instance, production_args());
    assert!(site.is_enabled(&ctx));
    assert!(!ssl.is_enabled(&ctx));

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "http://localhost:2368" }));
    let ctx = setup_context(&system, instance, production_args());
    assert!(!site.is_enabled(&ctx));

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "https://blog.example.com" }));
    let ctx = setup_context(&system, instance, local_args());
    assert!(!site.is_enabled(&ctx));
    assert!(!ssl.is_enabled(&ctx));
}

#[tokio::test]
async fn test_ssl_skips_without_nginx_site() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let ssl = step(nginx(&temp).setup().unwrap(), "ssl");

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "https://blog.example.com" }));
    let ctx = setup_context(&system, instance, production_args());
    assert_eq!(
        ssl.check_skip(&ctx).await.unwrap(),
        SkipDecision::SkipWithReason("Nginx config file not found, skipping SSL setup".into())
    );

    touch(&temp.path().join("nginx/sites-available").join(site_file("blog.example.com")));
    touch(
        &temp
            .path()
            .join("nginx/sites-available/blog.example.com-ssl.conf"),
    );
    assert_eq!(
        ssl.check_skip(&ctx).await.unwrap(),
        SkipDecision::SkipWithReason("SSL has already been set up".into())
    );
}

#[tokio::test]
async fn test_nginx_uninstall_removes_site_links() {
    let temp = TempDir::new().unwrap();
    let ui = DryRunUi::new();
    let system = system(temp.path(), ExtensionRegistry::new(), ui.clone());
    let extension = nginx(&temp);

    let available = touch(&extension.paths().available().join("blog.example.com.conf"));
    let enabled = touch(&extension.paths().enabled().join("blog.example.com.conf"));

    let instance =
        instance_with_config(&system, temp.path(), json!({ "url": "https://blog.example.com" }));
    extension.uninstall(&instance, ui.as_ref()).await.unwrap();

    let removals: Vec<String> = ui
        .elevated()
        .into_iter()
        .filter(|line| line.starts_with("rm -f"))
        .collect();
    assert_eq!(
        removals,
        [
            format!("rm -f {}", enabled.display()),
            format!("rm -f {}", available.display()),
        ]
    );
}

#[tokio::test]
async fn test_nginx_uninstall_without_url_is_noop() {
    let temp = TempDir::new().unwrap();
    let ui = DryRunUi::new();
    let system = system(temp.path(), ExtensionRegistry::new(), ui.clone());
    let instance = instance_with_config(&system, temp.path(), json!({}));

    nginx(&temp).uninstall(&instance, ui.as_ref()).await.unwrap();
    assert!(ui.elevated().is_empty());
}

#[test]
fn test_legacy_certificate_migration_gate() {
    let temp = TempDir::new().unwrap();
    let migrations = nginx(&temp).migrations().unwrap();
    assert_eq!(migrations.len(), 1);

    let migration = &migrations[0];
    assert!(migration.is_pending(None));
    assert!(migration.is_pending(Some(&semver::Version::new(1, 1, 9))));
    assert!(!migration.is_pending(Some(&semver::Version::new(1, 2, 0))));
}

// ============================================================================
// systemd
// ============================================================================

#[tokio::test]
async fn test_systemd_step_skips_existing_unit() {
    let temp = TempDir::new().unwrap();
    let unit_dir = temp.path().join("units");
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let extension = SystemdExtension::new(&unit_dir);
    let unit_step = step(extension.setup().unwrap(), "systemd");

    let mut instance = instance_with_config(
        &system,
        temp.path(),
        json!({ "url": "https://blog.example.com", "process": "systemd" }),
    );
    instance.set_name("blog").unwrap();
    let ctx = setup_context(&system, instance, production_args());
    assert!(unit_step.is_enabled(&ctx));
    assert_eq!(unit_step.check_skip(&ctx).await.unwrap(), SkipDecision::Run);

    touch(&unit_dir.join(unit_file("blog")));
    assert!(unit_step.check_skip(&ctx).await.unwrap().is_skip());
}

#[test]
fn test_systemd_step_disabled_for_other_managers() {
    let temp = TempDir::new().unwrap();
    let system = system(temp.path(), ExtensionRegistry::new(), DryRunUi::new());
    let unit_step = step(SystemdExtension::default().setup().unwrap(), "systemd");

    let instance = instance_with_config(&system, temp.path(), json!({ "process": "local" }));
    let ctx = setup_context(&system, instance, production_args());
    assert!(!unit_step.is_enabled(&ctx));
}

#[tokio::test]
async fn test_systemd_uninstall_removes_unit() {
    let temp = TempDir::new().unwrap();
    let unit_dir = temp.path().join("units");
    let ui = DryRunUi::new();
    let system = system(temp.path(), ExtensionRegistry::new(), ui.clone());
    let extension = SystemdExtension::new(&unit_dir);

    let unit = touch(&unit_dir.join(unit_file("blog")));
    let mut instance = instance_with_config(&system, temp.path(), json!({}));
    instance.set_name("blog").unwrap();

    extension.uninstall(&instance, ui.as_ref()).await.unwrap();
    assert_eq!(
        ui.elevated(),
        [
            "systemctl disable --quiet ghost_blog".to_string(),
            format!("rm -f {}", unit.display()),
            "systemctl daemon-reload".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_systemd_uninstall_without_unit_is_noop() {
    let temp = TempDir::new().unwrap();
    let ui = DryRunUi::new();
    let system = system(temp.path(), ExtensionRegistry::new(), ui.clone());
    let instance = instance_with_config(&system, temp.path(), json!({}));

    SystemdExtension::new(temp.path().join("units"))
        .uninstall(&instance, ui.as_ref())
        .await
        .unwrap();
    assert!(ui.elevated().is_empty());
}
