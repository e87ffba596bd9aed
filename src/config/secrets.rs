//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for connection strings and keys.

pub use secrecy::{ExposeSecret, SecretString};
