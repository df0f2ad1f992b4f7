//! Run context shared by setup steps

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::instance::Instance;
use crate::system::System;
use crate::ui::Ui;

/// Options of a setup run, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct SetupArgs {
    /// Development-friendly setup: local process, sqlite, no system services
    pub local: bool,
    /// Only run these step ids
    pub stages: Vec<String>,
    /// Step ids turned off with `--no-setup-<id>`
    pub disabled: Vec<String>,
    /// Leave the application stopped at the end
    pub no_start: bool,
    /// Do not register the application for start on boot
    pub no_enable: bool,

    pub url: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub process: Option<String>,
    pub content_path: Option<String>,

    pub db: Option<String>,
    pub dbhost: Option<String>,
    pub dbuser: Option<String>,
    pub dbpass: Option<String>,
    pub dbname: Option<String>,
    pub dbpath: Option<String>,

    /// Email used for certificate registration
    pub sslemail: Option<String>,
}

impl SetupArgs {
    /// Whether any flag would change the application config
    pub fn has_config_overrides(&self) -> bool {
        self.url.is_some()
            || self.ip.is_some()
            || self.port.is_some()
            || self.process.is_some()
            || self.content_path.is_some()
            || self.db.is_some()
            || self.dbhost.is_some()
            || self.dbuser.is_some()
            || self.dbpass.is_some()
            || self.dbname.is_some()
            || self.dbpath.is_some()
    }
}

/// State threaded through one setup run
pub struct SetupContext {
    pub system: System,
    pub instance: Instance,
    pub args: SetupArgs,
    /// Results handed from one step to a later one, keyed by producer
    pub values: Map<String, Value>,
}

impl SetupContext {
    pub fn new(system: System, instance: Instance, args: SetupArgs) -> Self {
        Self {
            system,
            instance,
            args,
            values: Map::new(),
        }
    }

    pub fn ui(&self) -> Arc<dyn Ui> {
        self.system.ui()
    }
}
