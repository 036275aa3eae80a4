//! Value types shared across the CASFA crates.

mod depot;
mod ids;
mod keys;
mod node;
mod token;
mod user;

pub use depot::Depot;
pub use ids::{DelegateId, DepotId, IdParseError, Realm};
pub use keys::{NODE_KEY_LEN, NodeKey, NodeKeyParseError, size_flag};
pub use node::{Delegate, DelegatePermissions, NodeKind, NodeMeta, RealmUsage};
pub use token::{ACCESS_TOKEN_LEN, AccessToken, REFRESH_TOKEN_LEN, RefreshToken};
pub use user::{LocalUser, UserRole};
