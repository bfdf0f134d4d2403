//! Credential acquisition for kubelogin.
//!
//! Cloud registry, OAuth2 client, credential providers, proof-of-possession
//! signing and the token caches.

pub mod assertion;
pub mod authority;
pub mod cache;
pub mod cloud;
pub mod fs;
pub mod pop;
pub mod providers;

pub use authority::{AuthorityClient, EndpointVersion, TokenResponse};
pub use cache::{CachedToken, PersistentCache, TokenCache};
pub use cloud::CloudConfiguration;
pub use pop::{PopBinding, PopKey};
pub use providers::{CredentialProvider, new_credential};
