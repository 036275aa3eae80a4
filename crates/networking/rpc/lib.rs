//! CASFA HTTP surface: JSON over REST, binary node bodies as
//! `application/octet-stream`, errors as `{error, message}`.

pub mod admin;
pub mod authentication;
pub mod delegates;
pub mod depots;
pub mod fs;
pub mod local_idp;
pub mod nodes;
pub mod rpc;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use rpc::{ApiContext, start_api};
pub use utils::RpcErr;
