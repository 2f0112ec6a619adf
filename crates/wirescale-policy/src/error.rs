//! error vocabulary for policy loading and compilation.
//!
//! these are reported to the operator at policy load; the server keeps
//! the previously compiled rules when any of them fire.

use thiserror::Error;

/// errors produced while parsing or compiling a policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// the document parsed but contained no sections.
    #[error("empty policy")]
    EmptyPolicy,

    /// an acl entry used an action other than "accept".
    #[error("invalid action")]
    InvalidAction,

    /// a users entry matched no alias form.
    #[error("invalid user section")]
    InvalidUserSection,

    /// a group was missing or contained another group.
    #[error("invalid group: {0}")]
    InvalidGroup(String),

    /// a tag had no tag-owners entry.
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// a group referenced a namespace that does not exist.
    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    /// a destination port token could not be parsed.
    #[error("invalid port format")]
    InvalidPortFormat,

    /// the document was not valid (permissive) json.
    #[error("invalid policy document: {0}")]
    Parse(String),
}
