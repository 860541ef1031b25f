//! Shared types for the Drive MCP gateway crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
