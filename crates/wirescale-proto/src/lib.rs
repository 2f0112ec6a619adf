//! node-facing wire protocol for wirescale.
//!
//! this crate handles:
//! - the nacl-box seal/open codec used on every machine endpoint
//! - register request/response types
//! - map request/response types (peers, dns, relay map, packet filter)

#![warn(missing_docs)]

mod error;
mod map;
mod register;
mod seal;

pub use error::Error;
pub use map::{
    DerpMap, DerpNode, DerpRegion, DnsConfig, FilterRule, MapNode, MapRequest, MapResponse,
    NetPortRange, PortRange, UserProfile,
};
pub use register::{LoginInfo, RegisterAuth, RegisterRequest, RegisterResponse, UserInfo};
pub use seal::{NONCE_LEN, ServerKeypair, frame, open, seal, seal_framed};

/// result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;
