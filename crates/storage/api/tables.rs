//! Table names used by the storage engine.

/// Delegates table: `[u8; 16]` => JSON `Delegate`
/// - key = `delegate_id` raw bytes
pub const DELEGATES: &str = "delegates";

/// Per-realm delegate index: `[u8; 32]` => `[u8; 16]`
/// - key = `realm ‖ delegate_id`
/// - value = `delegate_id` raw bytes
pub const REALM_DELEGATES: &str = "realm_delegates";

/// Ownership table: `[u8; 32]` => JSON `Vec<DelegateId>`
/// - key = `realm ‖ node_key`
/// - updated with compare-and-swap; writes union, never remove
pub const OWNERSHIP: &str = "ownership";

/// Ref-count table: `[u8; 32]` => `[u8; 8]`
/// - key = `realm ‖ node_key`
/// - value = `count.to_le_bytes()`, bumped with compare-and-swap
pub const REF_COUNT: &str = "ref_count";

/// Depots table: `[u8; 32]` => JSON `Depot`
/// - key = `realm ‖ depot_id`
/// - head advances go through compare-and-swap (last writer wins)
pub const DEPOTS: &str = "depots";

/// Usage table: `[u8; 16]` => JSON `RealmUsage`
/// - key = `realm` raw bytes
pub const USAGE: &str = "usage";

/// User roles table: `Vec<u8>` => `Vec<u8>`
/// - key = UTF-8 user id, value = UTF-8 role name
pub const USER_ROLES: &str = "user_roles";

/// Decoded scope sets: `[u8; 32]` => JSON `Vec<NodeKey>`
/// - key = `realm ‖ set_node_key`
pub const SCOPE_SETS: &str = "scope_sets";

/// Node metadata: `[u8; 32]` => JSON `NodeMeta`
/// - key = `realm ‖ node_key`, written on first persist
pub const NODE_META: &str = "node_meta";

/// Local identity-provider accounts: `Vec<u8>` => JSON `LocalUser`
/// - key = UTF-8 username
pub const LOCAL_USERS: &str = "local_users";

pub const TABLES: [&str; 10] = [
    DELEGATES,
    REALM_DELEGATES,
    OWNERSHIP,
    REF_COUNT,
    DEPOTS,
    USAGE,
    USER_ROLES,
    SCOPE_SETS,
    NODE_META,
    LOCAL_USERS,
];
