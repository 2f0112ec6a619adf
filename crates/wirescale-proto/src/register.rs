//! register request/response types for `/machine/:mkey/register`.
//!
//! field names use pascalcase to match the client's json encoding.
//! keys serialize as bare hex.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use wirescale_types::{HostInfo, NodeKey};

/// a registration request from a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterRequest {
    /// client capability version.
    #[serde(default)]
    pub version: u64,

    /// node's current public key.
    pub node_key: NodeKey,

    /// previous node key, presented during key rotation.
    #[serde(default)]
    pub old_node_key: NodeKey,

    /// authentication info (pre-auth key or provider token carrier).
    #[serde(default)]
    pub auth: Option<RegisterAuth>,

    /// requested registration expiry.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,

    /// host information.
    #[serde(default)]
    pub hostinfo: Option<HostInfo>,

    /// endpoint candidates the client can be reached at.
    #[serde(default)]
    pub endpoints: Vec<std::net::SocketAddr>,
}

/// authentication block inside a register request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterAuth {
    /// auth provider name, if any.
    #[serde(default)]
    pub provider: String,

    /// pre-auth key secret.
    #[serde(default)]
    pub auth_key: String,
}

/// a registration response sealed back to the node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterResponse {
    /// owning user/namespace info for this node.
    pub user: UserInfo,

    /// login info.
    pub login: LoginInfo,

    /// whether the presented node key has expired and must rotate.
    #[serde(default)]
    pub node_key_expired: bool,

    /// whether the machine is authorized. when false the client polls.
    pub machine_authorized: bool,

    /// if non-empty, the operator must visit this url to complete auth.
    #[serde(rename = "AuthURL", default, skip_serializing_if = "String::is_empty")]
    pub auth_url: String,

    /// error message if registration failed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// namespace info rendered in a register response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserInfo {
    /// namespace id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// display name.
    #[serde(default)]
    pub display_name: String,
}

/// login info rendered in a register response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoginInfo {
    /// login id.
    #[serde(rename = "ID")]
    pub id: u64,

    /// provider that authenticated the login (authkey, oidc, cli).
    #[serde(default)]
    pub provider: String,

    /// login name.
    #[serde(default)]
    pub login_name: String,

    /// display name.
    #[serde(default)]
    pub display_name: String,
}
