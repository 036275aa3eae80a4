use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;

use casfa_common::CoreConfig;
use casfa_common::config::{
    DEFAULT_MAX_DELEGATION_DEPTH, DEFAULT_MAX_HISTORY, DEFAULT_MAX_MAX_HISTORY,
    DEFAULT_MAX_NAME_BYTES, DEFAULT_NODE_LIMIT,
};
use clap::Parser as ClapParser;
use tracing::Level;

#[derive(ClapParser)]
#[command(
    name = "casfa",
    version = env!("CARGO_PKG_VERSION"),
    about = "CASFA content-addressed storage service"
)]
pub struct CLI {
    #[command(flatten)]
    pub opts: Options,
}

#[derive(ClapParser, Debug, Clone)]
pub struct Options {
    #[arg(
        long = "http.addr",
        default_value = "0.0.0.0",
        value_name = "ADDRESS",
        help = "Listening address for the http server.",
        help_heading = "Server options",
        env = "CASFA_HTTP_ADDR"
    )]
    pub http_addr: String,
    #[arg(
        long = "http.port",
        default_value = "8456",
        value_name = "PORT",
        help = "Listening port for the http server.",
        help_heading = "Server options",
        env = "CASFA_HTTP_PORT"
    )]
    pub http_port: String,
    #[arg(
        long = "datadir",
        value_name = "DATA_DIRECTORY",
        default_value = "casfa-data",
        help = "Directory holding blobs and the JWT secret.",
        long_help = "If the datadir is the word `memory`, casfa keeps all state in memory and loses it on shutdown.",
        help_heading = "Storage options",
        env = "CASFA_DATADIR"
    )]
    pub datadir: PathBuf,
    #[arg(
        long = "jwt-secret-file",
        value_name = "SECRET_FILE",
        help = "File holding the hex HS256 secret for user JWTs; created with a random secret when absent.",
        help_heading = "Auth options",
        env = "CASFA_JWT_SECRET_FILE"
    )]
    pub jwt_secret_file: Option<PathBuf>,
    #[arg(
        long = "node-limit",
        default_value_t = DEFAULT_NODE_LIMIT,
        value_name = "BYTES",
        help = "Maximum size of a single encoded node.",
        help_heading = "Limits",
        env = "CASFA_NODE_LIMIT"
    )]
    pub node_limit: usize,
    #[arg(
        long = "max-name-bytes",
        default_value_t = DEFAULT_MAX_NAME_BYTES,
        value_name = "BYTES",
        help = "Maximum byte length of a directory entry name.",
        help_heading = "Limits",
        env = "CASFA_MAX_NAME_BYTES"
    )]
    pub max_name_bytes: usize,
    #[arg(
        long = "default-max-history",
        default_value_t = DEFAULT_MAX_HISTORY,
        value_name = "COUNT",
        help = "History length assigned to new depots.",
        help_heading = "Limits",
        env = "CASFA_DEFAULT_MAX_HISTORY"
    )]
    pub default_max_history: usize,
    #[arg(
        long = "max-max-history",
        default_value_t = DEFAULT_MAX_MAX_HISTORY,
        value_name = "COUNT",
        help = "Hard cap on per-depot history length.",
        help_heading = "Limits",
        env = "CASFA_MAX_MAX_HISTORY"
    )]
    pub max_max_history: usize,
    #[arg(
        long = "max-delegation-depth",
        default_value_t = DEFAULT_MAX_DELEGATION_DEPTH,
        value_name = "DEPTH",
        help = "Maximum delegate chain depth.",
        help_heading = "Limits",
        env = "CASFA_MAX_DELEGATION_DEPTH"
    )]
    pub max_delegation_depth: u8,
    #[arg(
        long = "root-access-ttl",
        default_value_t = 3600,
        value_name = "SECONDS",
        help = "Access-token lifetime for root delegates.",
        help_heading = "Auth options",
        env = "CASFA_ROOT_ACCESS_TTL"
    )]
    pub root_access_ttl_secs: u64,
    #[arg(
        long = "root-refresh-ttl",
        default_value_t = 30 * 24 * 3600,
        value_name = "SECONDS",
        help = "Refresh-token lifetime for root delegates.",
        help_heading = "Auth options",
        env = "CASFA_ROOT_REFRESH_TTL"
    )]
    pub root_refresh_ttl_secs: u64,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Server options",
        env = "CASFA_LOG_LEVEL"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        default_value_t = LogColor::Auto,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never",
        help_heading = "Server options",
        env = "CASFA_LOG_COLOR"
    )]
    pub log_color: LogColor,
}

impl Options {
    pub fn core_config(&self) -> CoreConfig {
        CoreConfig {
            node_limit: self.node_limit,
            max_name_bytes: self.max_name_bytes,
            default_max_history: self.default_max_history,
            max_max_history: self.max_max_history,
            max_delegation_depth: self.max_delegation_depth,
            root_access_ttl: Duration::from_secs(self.root_access_ttl_secs),
            root_refresh_ttl: Duration::from_secs(self.root_refresh_ttl_secs),
        }
    }

    pub fn is_memory_datadir(&self) -> bool {
        self.datadir.as_os_str() == "memory"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogColor {
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => f.write_str("auto"),
            LogColor::Always => f.write_str("always"),
            LogColor::Never => f.write_str("never"),
        }
    }
}
