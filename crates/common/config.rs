//! Core service configuration.
//!
//! A plain value passed through construction; the binary populates it from
//! CLI flags / environment variables.

use std::time::Duration;

/// Default maximum encoded node size (4 MiB).
pub const DEFAULT_NODE_LIMIT: usize = 4 * 1024 * 1024;
/// Default maximum byte length of a single directory-entry name.
pub const DEFAULT_MAX_NAME_BYTES: usize = 255;
/// Default number of previous roots retained per depot.
pub const DEFAULT_MAX_HISTORY: usize = 20;
/// Upper bound a depot's `max_history` may be raised to.
pub const DEFAULT_MAX_MAX_HISTORY: usize = 100;
/// Maximum delegation chain depth (root delegate = 0).
pub const DEFAULT_MAX_DELEGATION_DEPTH: u8 = 15;
/// Default access-token lifetime for root delegates (1 hour).
pub const DEFAULT_ROOT_ACCESS_TTL: Duration = Duration::from_secs(60 * 60);
/// Default refresh-token lifetime for root delegates (30 days).
pub const DEFAULT_ROOT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Limits and default lifetimes shared by the core services.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Maximum size in bytes of a single encoded node.
    pub node_limit: usize,
    /// Maximum byte length of a directory-entry name.
    pub max_name_bytes: usize,
    /// History length assigned to newly created depots.
    pub default_max_history: usize,
    /// Hard cap on per-depot history length.
    pub max_max_history: usize,
    /// Maximum delegate depth; minting below this fails.
    pub max_delegation_depth: u8,
    /// Access-token TTL granted to root delegates.
    pub root_access_ttl: Duration,
    /// Refresh-token TTL granted to root delegates.
    pub root_refresh_ttl: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        CoreConfig {
            node_limit: DEFAULT_NODE_LIMIT,
            max_name_bytes: DEFAULT_MAX_NAME_BYTES,
            default_max_history: DEFAULT_MAX_HISTORY,
            max_max_history: DEFAULT_MAX_MAX_HISTORY,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            root_access_ttl: DEFAULT_ROOT_ACCESS_TTL,
            root_refresh_ttl: DEFAULT_ROOT_REFRESH_TTL,
        }
    }
}
