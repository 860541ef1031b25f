//! Google OAuth2 credential lifecycle for a single owner account
//!
//! `StateGuard` issues and consumes anti-forgery state tokens,
//! `CredentialStore` keeps the owner's tokens and refreshes them on read, and
//! `AuthorizationFlow` sequences the authorization-code grant across both.

pub mod clock;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod state;
pub mod token;

pub use clock::{Clock, Entropy, FixedEntropy, ManualClock, OsEntropy, SystemClock};
pub use credentials::{CredentialRecord, CredentialStore};
pub use error::{Error, Result};
pub use flow::{Authorized, AuthorizationFlow, FlowSettings, FlowState};
pub use state::StateGuard;
pub use token::{ClientCredentials, ExchangeFuture, HttpTokenExchanger, TokenExchanger, TokenResponse};
