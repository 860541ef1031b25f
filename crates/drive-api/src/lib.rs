//! Read-only Google Drive facade
//!
//! `DriveClient` lists, searches and reads the owner's files, taking a live
//! bearer token from `drive_auth::CredentialStore` on every call.

pub mod client;
pub mod content;
pub mod error;

pub use client::DriveClient;
pub use content::{DriveFile, FileContent};
pub use error::{Error, Result};
