//! # ghost-extensions
//!
//! Extensions compiled into the CLI:
//! - [`mysql`]: dedicated database user instead of `root`
//! - [`nginx`]: reverse proxy site and TLS certificates
//! - [`systemd`]: the `systemd` process manager and its unit file

pub mod mysql;
pub mod nginx;
pub mod systemd;
pub mod templates;

use std::sync::Arc;

use ghost_lifecycle::ExtensionRegistry;

pub use mysql::MysqlExtension;
pub use nginx::{NginxExtension, NginxPaths};
pub use systemd::{SystemdExtension, SystemdFactory, SystemdManager};

/// Every built-in extension, in discovery order
pub fn builtin() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    registry
        .register(Arc::new(MysqlExtension))
        .register(Arc::new(NginxExtension::default()))
        .register(Arc::new(SystemdExtension::default()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_discovery_order() {
        assert_eq!(builtin().names(), ["mysql", "nginx", "systemd"]);
    }
}
