//! Token caches.
//!
//! Two layers: the ExecCredential-side [`TokenCache`] consumed by the
//! `get-token` pipeline, and the provider-side [`PersistentCache`] that lets
//! interactive providers refresh silently.

pub mod accessor;
pub mod keys;
pub mod persistent;
pub mod token_cache;

pub use accessor::{CacheAccessor, EncryptedFileAccessor};
pub use persistent::{CacheState, PersistentCache};
pub use token_cache::{CachedToken, TokenCache};
