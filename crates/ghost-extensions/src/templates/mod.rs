//! Embedded configuration templates
//!
//! Tera templates for the files extensions install on the host: the nginx
//! site (plain and TLS) and the systemd unit.

use anyhow::Result;
use serde::Serialize;
use tera::{Context, Tera};
use tracing::debug;

pub const NGINX_SITE: &str = "nginx.conf";
pub const NGINX_SSL_SITE: &str = "nginx-ssl.conf";
pub const SYSTEMD_UNIT: &str = "ghost.service";

/// Values for an nginx site
#[derive(Debug, Clone, Serialize)]
pub struct SiteContext {
    pub server_name: String,
    /// Directory served for ACME challenges
    pub webroot: String,
    /// Url path the application is mounted at
    pub location: String,
    pub port: u16,
    pub fullchain: Option<String>,
    pub privkey: Option<String>,
}

/// Values for a systemd unit
#[derive(Debug, Clone, Serialize)]
pub struct UnitContext {
    pub name: String,
    pub dir: String,
    pub user: String,
    pub environment: String,
    pub command: String,
}

/// All templates, parsed once
pub struct Templates {
    tera: Tera,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(NGINX_SITE, include_str!("nginx.conf.tera"))?;
        tera.add_raw_template(NGINX_SSL_SITE, include_str!("nginx-ssl.conf.tera"))?;
        tera.add_raw_template(SYSTEMD_UNIT, include_str!("ghost.service.tera"))?;
        Ok(Self { tera })
    }

    /// Render `template` with any serializable context
    pub fn render<T: Serialize>(&self, template: &str, values: &T) -> Result<String> {
        debug!("Rendering template: {}", template);
        let context = Context::from_serialize(values)?;
        Ok(self.tera.render(template, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(location: &str) -> SiteContext {
        SiteContext {
            server_name: "blog.example.com".to_string(),
            webroot: "/var/www/blog/system/nginx-root".to_string(),
            location: location.to_string(),
            port: 2368,
            fullchain: Some("/etc/letsencrypt/blog.example.com/fullchain.cer".to_string()),
            privkey: Some("/etc/letsencrypt/blog.example.com/blog.example.com.key".to_string()),
        }
    }

    #[test]
    fn test_site_renders_proxy() {
        let templates = Templates::new().unwrap();
        let out = templates.render(NGINX_SITE, &site("/")).unwrap();
        assert!(out.contains("server_name blog.example.com;"));
        assert!(out.contains("proxy_pass http://127.0.0.1:2368;"));
        assert!(out.contains("$proxy_add_x_forwarded_for"));
        assert!(!out.contains("proxy_redirect"));
    }

    #[test]
    fn test_subdirectory_site_disables_redirects() {
        let templates = Templates::new().unwrap();
        let out = templates.render(NGINX_SITE, &site("/blog/")).unwrap();
        assert!(out.contains("location /blog/ {"));
        assert!(out.contains("proxy_redirect off;"));
    }

    #[test]
    fn test_ssl_site_references_certificates() {
        let templates = Templates::new().unwrap();
        let out = templates.render(NGINX_SSL_SITE, &site("/")).unwrap();
        assert!(out.contains("listen 443 ssl http2;"));
        assert!(out.contains("ssl_certificate /etc/letsencrypt/blog.example.com/fullchain.cer;"));
    }

    #[test]
    fn test_unit_renders_service() {
        let templates = Templates::new().unwrap();
        let unit = UnitContext {
            name: "blog-example-com".to_string(),
            dir: "/var/www/blog".to_string(),
            user: "ghost".to_string(),
            environment: "production".to_string(),
            command: "node current/index.js".to_string(),
        };
        let out = templates.render(SYSTEMD_UNIT, &unit).unwrap();
        assert!(out.contains("WorkingDirectory=/var/www/blog"));
        assert!(out.contains("Environment=\"NODE_ENV=production\""));
        assert!(out.contains("ExecStart=/usr/bin/env node current/index.js"));
    }
}
