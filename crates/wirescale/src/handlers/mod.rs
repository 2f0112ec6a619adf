//! http handlers for the node-facing and admin endpoints.

pub mod api_auth;
pub mod api_v1;
mod error;
mod health;
mod key;
mod map;
mod oidc;
mod register;
mod register_web;
pub mod templates;

pub use error::{ApiError, OptionExt, ResultExt};
pub use health::health;
pub use key::key;
pub use map::map;
pub use oidc::{oidc_callback, oidc_register};
pub use register::register;
pub use register_web::register_web;
