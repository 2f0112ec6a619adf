//! core types for wirescale - a coordination server for a wireguard mesh overlay.
//!
//! this crate provides the fundamental data structures used throughout wirescale:
//! - [`Node`]: a registered member of the overlay
//! - [`Namespace`]: the tenancy boundary grouping nodes under one owner
//! - [`PreAuthKey`]: pre-authentication keys for automated registration
//! - [`ApiKey`]: bearer secrets for admin callers
//! - [`Config`]: application configuration

#![warn(missing_docs)]

mod api_key;
mod auth_key_token;
mod config;
mod error;
mod keys;
mod namespace;
mod node;
mod node_name;
mod preauth_key;
pub mod test_utils;

pub use api_key::{API_KEY_PREFIX_LEN, ApiKey};
pub use auth_key_token::{AUTH_KEY_LEN, AuthKeyToken};
pub use config::{
    Config, DatabaseConfig, DerpConfig, DnsConfig, OidcConfig, TuningConfig,
    DEFAULT_KEEPALIVE_INTERVAL_SECS, DEFAULT_UPDATE_CHECK_INTERVAL_SECS,
};
pub use error::Error;
pub use keys::{DiscoKey, MachineKey, NodeKey};
pub use namespace::{Namespace, NamespaceId};
pub use node::{HostInfo, NetInfo, Node, NodeId, RegisterMethod};
pub use node_name::{MAX_NODE_NAME_LEN, NodeName};
pub use preauth_key::PreAuthKey;

/// result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
