//! Reverse proxy and TLS through nginx
//!
//! Site files are rendered into the instance's `system/files`, linked into
//! `sites-available` and enabled with a second link in `sites-enabled`.
//! Certificates are issued by acme.sh with a webroot challenge.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use ghost_core::paths::SYSTEM_FILES_DIR;
use ghost_core::utils::command_exists;
use ghost_core::Error;
use ghost_lifecycle::setup::is_local_url;
use ghost_lifecycle::{template, Extension, Instance, Migration, SetupContext, Ui};
use ghost_tasks::{SkipDecision, Step, TaskError, TaskHandle};
use semver::Version;
use tracing::{debug, info};
use url::Url;

use crate::templates::{SiteContext, Templates, NGINX_SITE, NGINX_SSL_SITE};

/// Default nginx configuration root
pub const NGINX_ROOT: &str = "/etc/nginx";

/// Default acme.sh home, also holding issued certificates
pub const ACME_HOME: &str = "/etc/letsencrypt";

/// Certificate directory used before acme.sh took over issuing
const LEGACY_LIVE_DIR: &str = "/etc/letsencrypt/live";

const ACME_REPO: &str = "https://github.com/acmesh-official/acme.sh.git";

/// Locations the extension writes to
#[derive(Debug, Clone)]
pub struct NginxPaths {
    pub root: PathBuf,
    pub acme_home: PathBuf,
}

impl Default for NginxPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from(NGINX_ROOT),
            acme_home: PathBuf::from(ACME_HOME),
        }
    }
}

impl NginxPaths {
    pub fn available(&self) -> PathBuf {
        self.root.join("sites-available")
    }

    pub fn enabled(&self) -> PathBuf {
        self.root.join("sites-enabled")
    }

    fn acme(&self) -> PathBuf {
        self.acme_home.join("acme.sh")
    }

    pub fn fullchain(&self, host: &str) -> PathBuf {
        self.acme_home.join(host).join("fullchain.cer")
    }

    pub fn privkey(&self, host: &str) -> PathBuf {
        self.acme_home.join(host).join(format!("{}.key", host))
    }
}

pub fn site_file(host: &str) -> String {
    format!("{}.conf", host)
}

pub fn ssl_site_file(host: &str) -> String {
    format!("{}-ssl.conf", host)
}

/// nginx site and certificate management
#[derive(Debug, Clone, Default)]
pub struct NginxExtension {
    paths: NginxPaths,
}

impl NginxExtension {
    pub fn new(paths: NginxPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &NginxPaths {
        &self.paths
    }
}

#[async_trait]
impl Extension for NginxExtension {
    fn name(&self) -> &str {
        "nginx"
    }

    fn description(&self) -> &str {
        "Configures nginx as a reverse proxy and sets up SSL with acme.sh"
    }

    fn setup(&self) -> Result<Vec<Step<SetupContext>>, TaskError> {
        let skip_paths = self.paths.clone();
        let task_paths = self.paths.clone();
        let nginx = Step::builder("nginx")
            .title("Setting up nginx")
            .optional()
            .prompt("Do you wish to set up nginx?")
            .enabled(proxied)
            .skip(move |ctx| Box::pin(skip_nginx(skip_paths.clone(), ctx)))
            .task(move |ctx, _| Box::pin(setup_nginx(task_paths.clone(), ctx)))
            .build()?;

        let skip_paths = self.paths.clone();
        let task_paths = self.paths.clone();
        let ssl = Step::builder("ssl")
            .title("Setting up SSL")
            .optional()
            .prompt("Do you wish to set up SSL?")
            .enabled(|ctx: &SetupContext| {
                proxied(ctx)
                    && ctx
                        .instance
                        .url()
                        .and_then(|u| Url::parse(&u).ok())
                        .map(|u| u.scheme() == "https")
                        .unwrap_or(false)
            })
            .skip(move |ctx| Box::pin(skip_ssl(skip_paths.clone(), ctx)))
            .task(move |ctx, task| Box::pin(setup_ssl(task_paths.clone(), ctx, task)))
            .build()?;

        Ok(vec![nginx, ssl])
    }

    fn migrations(&self) -> Result<Vec<Migration>, TaskError> {
        let task_paths = self.paths.clone();
        let step = Step::builder("nginx-ssl-paths")
            .title("Moving legacy certificate paths")
            .enabled(|ctx: &SetupContext| !ctx.args.local)
            .skip(|ctx| Box::pin(skip_legacy_paths(ctx)))
            .task(move |ctx, _| Box::pin(move_legacy_paths(task_paths.clone(), ctx)))
            .build()?;
        Ok(vec![Migration::new(Version::new(1, 2, 0), step)])
    }

    async fn uninstall(&self, instance: &Instance, ui: &dyn Ui) -> anyhow::Result<()> {
        let Some(host) = instance.url().as_deref().and_then(host_of) else {
            return Ok(());
        };

        let mut removed = false;
        for file in [site_file(&host), ssl_site_file(&host)] {
            for dir in [self.paths.enabled(), self.paths.available()] {
                let path = dir.join(&file);
                if path.symlink_metadata().is_ok() {
                    ui.sudo("rm", &["-f", &path.to_string_lossy()]).await?;
                    removed = true;
                }
            }
        }

        if removed && command_exists("nginx") {
            reload(ui).await?;
        }
        Ok(())
    }
}

/// Not local and not addressed by IP
fn proxied(ctx: &SetupContext) -> bool {
    !ctx.args.local && ctx.instance.url().map(|u| !is_local_url(&u)).unwrap_or(false)
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

fn instance_url(instance: &Instance) -> anyhow::Result<Url> {
    let raw = instance
        .url()
        .context("No url configured for this instance")?;
    Ok(Url::parse(&raw)?)
}

/// Template values for the instance's site
pub fn site_context(
    instance: &Instance,
    url: &Url,
    paths: &NginxPaths,
) -> anyhow::Result<SiteContext> {
    let host = url
        .host_str()
        .context("The configured url has no host")?
        .to_string();
    let mut location = url.path().to_string();
    if !location.ends_with('/') {
        location.push('/');
    }
    let port = instance.process_context()?.port;

    Ok(SiteContext {
        webroot: webroot(instance.dir()).to_string_lossy().to_string(),
        location,
        port,
        fullchain: Some(paths.fullchain(&host).to_string_lossy().to_string()),
        privkey: Some(paths.privkey(&host).to_string_lossy().to_string()),
        server_name: host,
    })
}

fn webroot(dir: &Path) -> PathBuf {
    dir.join("system").join("nginx-root")
}

async fn skip_nginx(paths: NginxPaths, ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    if !command_exists("nginx") {
        return Ok("Nginx is not installed".into());
    }
    let url = instance_url(&ctx.instance)?;
    let host = url.host_str().unwrap_or_default();
    if paths.available().join(site_file(host)).exists() {
        return Ok(format!("Nginx configuration already found for {}", host).into());
    }
    Ok(SkipDecision::Run)
}

async fn setup_nginx(paths: NginxPaths, ctx: &mut SetupContext) -> anyhow::Result<()> {
    let ui = ctx.ui();
    let url = instance_url(&ctx.instance)?;
    let site = site_context(&ctx.instance, &url, &paths)?;
    std::fs::create_dir_all(webroot(ctx.instance.dir()))?;

    let contents = Templates::new()?.render(NGINX_SITE, &site)?;
    let file = site_file(&site.server_name);
    template(
        &ctx.instance,
        ui.as_ref(),
        &contents,
        "nginx config",
        &file,
        &paths.available(),
    )
    .await?;
    enable_site(ui.as_ref(), &paths, &file).await?;
    info!("Proxying {} to port {}", site.server_name, site.port);
    Ok(())
}

async fn skip_ssl(paths: NginxPaths, ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    let url = instance_url(&ctx.instance)?;
    let host = url.host_str().unwrap_or_default();
    if paths.available().join(ssl_site_file(host)).exists() {
        return Ok("SSL has already been set up".into());
    }
    if !paths.available().join(site_file(host)).exists() {
        return Ok("Nginx config file not found, skipping SSL setup".into());
    }
    Ok(SkipDecision::Run)
}

async fn setup_ssl(
    paths: NginxPaths,
    ctx: &mut SetupContext,
    task: &mut TaskHandle,
) -> anyhow::Result<()> {
    let ui = ctx.ui();
    let email = match ctx.args.sslemail.clone() {
        Some(email) => email,
        None if ui.allow_prompt() => {
            ui.prompt_text("Enter your email (for SSL certificate):", None)?
        }
        None => {
            return Err(Error::config("ssl.email", "No email provided for SSL certificate")
                .with_help("Pass --sslemail, or run `ghost setup ssl` interactively")
                .into())
        }
    };
    if email.trim().is_empty() {
        return task.skip("No email given, SSL not set up");
    }

    let url = instance_url(&ctx.instance)?;
    let site = site_context(&ctx.instance, &url, &paths)?;
    let host = site.server_name.clone();

    install_acme(ui.as_ref(), &paths, &email).await?;
    issue_certificate(ui.as_ref(), &paths, &host, &site.webroot, &email).await?;

    let contents = Templates::new()?.render(NGINX_SSL_SITE, &site)?;
    let file = ssl_site_file(&host);
    template(
        &ctx.instance,
        ui.as_ref(),
        &contents,
        "ssl config",
        &file,
        &paths.available(),
    )
    .await?;
    enable_site(ui.as_ref(), &paths, &file).await?;
    info!("Certificate for {} installed", host);
    Ok(())
}

async fn install_acme(ui: &dyn Ui, paths: &NginxPaths, email: &str) -> anyhow::Result<()> {
    if paths.acme().is_file() {
        debug!("acme.sh already installed at {}", paths.acme().display());
        return Ok(());
    }

    let checkout = std::env::temp_dir().join("acme.sh");
    let checkout_str = checkout.to_string_lossy();
    ui.sudo("rm", &["-rf", &checkout_str]).await?;
    ui.sudo("git", &["clone", "--depth", "1", ACME_REPO, &checkout_str])
        .await
        .context("Failed to download acme.sh")?;

    let install = format!(
        "cd {} && ./acme.sh --install --home {} --accountemail {}",
        checkout_str,
        paths.acme_home.display(),
        email
    );
    ui.sudo("sh", &["-c", &install])
        .await
        .context("Failed to install acme.sh")?;
    Ok(())
}

async fn issue_certificate(
    ui: &dyn Ui,
    paths: &NginxPaths,
    host: &str,
    webroot: &str,
    email: &str,
) -> anyhow::Result<()> {
    let acme = paths.acme();
    let home = paths.acme_home.to_string_lossy();
    let result = ui
        .sudo(
            &acme.to_string_lossy(),
            &[
                "--issue",
                "--home",
                &home,
                "--domain",
                host,
                "--webroot",
                webroot,
                "--reloadcmd",
                "nginx -s reload",
                "--accountemail",
                email,
            ],
        )
        .await;

    match result {
        Ok(_) => Ok(()),
        // acme.sh exits with 2 when a valid certificate is already in place
        Err(Error::Process {
            exit_code: Some(2),
            ..
        }) => {
            debug!("Certificate for {} is already current", host);
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!(
            "Failed to issue a certificate for {}; make sure its DNS points at this server",
            host
        ))),
    }
}

async fn enable_site(ui: &dyn Ui, paths: &NginxPaths, file: &str) -> anyhow::Result<()> {
    let available = paths.available().join(file);
    let enabled = paths.enabled().join(file);
    ui.sudo(
        "ln",
        &["-sf", &available.to_string_lossy(), &enabled.to_string_lossy()],
    )
    .await?;

    ui.sudo("nginx", &["-t"]).await.map_err(|e| {
        anyhow::Error::new(e).context("nginx rejected the generated configuration")
    })?;
    reload(ui).await
}

async fn reload(ui: &dyn Ui) -> anyhow::Result<()> {
    ui.sudo("nginx", &["-s", "reload"])
        .await
        .context("Failed to reload nginx")?;
    Ok(())
}

fn legacy_config(dir: &Path, host: &str) -> PathBuf {
    dir.join(SYSTEM_FILES_DIR).join(ssl_site_file(host))
}

async fn skip_legacy_paths(ctx: &SetupContext) -> anyhow::Result<SkipDecision> {
    let Some(host) = ctx.instance.url().as_deref().and_then(host_of) else {
        return Ok("No url configured".into());
    };
    let config = legacy_config(ctx.instance.dir(), &host);
    let contents = std::fs::read_to_string(&config).unwrap_or_default();
    if !contents.contains(LEGACY_LIVE_DIR) {
        return Ok("No legacy certificate paths found".into());
    }
    Ok(SkipDecision::Run)
}

/// Rewrite certificate paths in an SSL site written for the old layout
pub fn rewrite_legacy_paths(contents: &str, host: &str, paths: &NginxPaths) -> String {
    let live = format!("{}/{}", LEGACY_LIVE_DIR, host);
    contents
        .replace(
            &format!("{}/fullchain.pem", live),
            &paths.fullchain(host).to_string_lossy(),
        )
        .replace(
            &format!("{}/privkey.pem", live),
            &paths.privkey(host).to_string_lossy(),
        )
}

async fn move_legacy_paths(paths: NginxPaths, ctx: &mut SetupContext) -> anyhow::Result<()> {
    let url = instance_url(&ctx.instance)?;
    let host = url.host_str().unwrap_or_default().to_string();
    let config = legacy_config(ctx.instance.dir(), &host);

    let contents = std::fs::read_to_string(&config)
        .with_context(|| format!("Failed to read {}", config.display()))?;
    std::fs::write(&config, rewrite_legacy_paths(&contents, &host, &paths))
        .with_context(|| format!("Failed to write {}", config.display()))?;

    if command_exists("nginx") {
        reload(ctx.ui().as_ref()).await?;
    }
    Ok(())
}
