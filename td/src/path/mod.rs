//! Path security boundary
//!
//! [`PathValidator`] is the sole gatekeeper for filesystem paths. It defends
//! against `..` traversal, absolute paths outside the sandbox, NUL bytes,
//! Windows alternate data streams, and symlinks that resolve outside the base.

mod error;
mod validator;

pub use error::PathError;
pub use validator::PathValidator;
