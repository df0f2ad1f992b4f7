//! Persisted configuration
//!
//! Every piece of durable state is a [`ConfigStore`] constructed from an
//! explicit path:
//! - `<dir>/.ghost-cli` holds tool-internal instance state
//! - `<dir>/config.<environment>.json` holds the application config
//! - `<ghost home>/config` holds the cross-instance registry

mod store;

pub use store::ConfigStore;

/// Keys stored in the tool-internal `.ghost-cli` file
pub mod keys {
    pub const NAME: &str = "name";
    pub const ACTIVE_VERSION: &str = "active-version";
    pub const PREVIOUS_VERSION: &str = "previous-version";
    pub const CLI_VERSION: &str = "cli-version";
    pub const RUNTIME_VERSION: &str = "runtime-version";
    pub const RUNNING: &str = "running";

    /// Keys stored in the per-environment application config
    pub const URL: &str = "url";
    pub const PROCESS: &str = "process";
    pub const SERVER_HOST: &str = "server.host";
    pub const SERVER_PORT: &str = "server.port";
    pub const DATABASE_CLIENT: &str = "database.client";
    pub const DATABASE_HOST: &str = "database.connection.host";
    pub const DATABASE_USER: &str = "database.connection.user";
    pub const DATABASE_PASSWORD: &str = "database.connection.password";
    pub const DATABASE_NAME: &str = "database.connection.database";
    pub const DATABASE_FILE: &str = "database.connection.filename";
    pub const CONTENT_PATH: &str = "paths.contentPath";
    pub const RUN_COMMAND: &str = "run.command";
    pub const START_TIMEOUT: &str = "run.startTimeout";
    pub const LOGGING_TRANSPORTS: &str = "logging.transports";

    /// Global registry key
    pub const INSTANCES: &str = "instances";
}
