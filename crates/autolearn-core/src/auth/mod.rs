//! Authentication: cached tokens and session establishment.
//!
//! This module provides:
//! - `CredentialStore`: per-user token cache on disk, sealed with `TokenCipher`
//! - `SessionManager`: reuses a cached token when it still validates, logs in otherwise
//!
//! Cached records expire after `token_expire_hours` (24 by default).

pub mod credentials;
pub mod crypto;
pub mod session;

pub use credentials::{CredentialMap, CredentialRecord, CredentialStore};
pub use crypto::{CipherError, TokenCipher};
pub use session::{Session, SessionManager, SessionState};
