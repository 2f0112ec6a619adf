//! error type for the types crate.

use thiserror::Error;

/// errors produced when constructing or parsing domain types.
#[derive(Debug, Error)]
pub enum Error {
    /// a key could not be parsed from its text form.
    #[error("invalid {0} key")]
    InvalidKey(&'static str),

    /// a namespace name failed dns-label validation.
    #[error("invalid namespace name: {0}")]
    InvalidNamespaceName(String),

    /// a pre-auth key secret had the wrong shape.
    #[error("invalid pre-auth key")]
    InvalidAuthKey,

    /// a presented api key had the wrong shape.
    #[error("invalid api key")]
    InvalidApiKey,

    /// bcrypt failed while generating an api key.
    #[error("could not generate api key")]
    ApiKeyGeneration,
}
