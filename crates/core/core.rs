//! # CASFA core
//!
//! Realm-scoped domain logic for the content-addressed storage service.
//!
//! ## Key components
//!
//! - [`nodes::NodeService`]: check / put / get / metadata / claim over
//!   immutable nodes, with proof-of-possession, ref-count and ownership
//!   bookkeeping and usage metering
//! - [`fs::FsService`]: the depot mutator — path-indexed operations that
//!   rewrite the Dict spine bottom-up and yield a new root
//! - [`depots::DepotService`]: named heads with bounded history and the
//!   guaranteed per-realm main depot
//! - [`delegates::DelegateEngine`]: root-delegate bootstrap, child minting
//!   with non-expanding authority, token issuance and refresh, revocation
//!   cascades
//! - [`auth`]: the derived request principal, per-endpoint policies and
//!   the pluggable JWT verifier port
//!
//! ## Write path
//!
//! ```text
//! 1. Auth pipeline derives a Principal from the bearer credential
//! 2. NodeService verifies the key, persists the blob (write-then-publish)
//! 3. Ref-counts bump: +1 self-upload, +1 per referenced child occurrence
//! 4. Ownership unions in the uploading delegate
//! 5. FsService splices a new spine; DepotService advances the head
//! ```

pub mod auth;
pub mod delegates;
pub mod depots;
pub mod error;
pub mod fs;
pub mod nodes;

pub use error::CoreError;
