//! acl policy for wirescale.
//!
//! this crate parses the operator-authored policy document (a permissive
//! json dialect tolerating comments and trailing commas) and compiles it
//! over the current node set into the concrete packet-filter rules that
//! ride along in every map response.

#![warn(missing_docs)]

mod compiler;
mod error;
mod policy;

pub use compiler::compile;
pub use error::Error;
pub use policy::{Acl, AclPolicy};

/// result type for policy operations.
pub type Result<T> = std::result::Result<T, Error>;
