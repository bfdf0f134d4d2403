//! kubelogin core
//!
//! Shared vocabulary for the kubelogin crates: errors, login methods,
//! access tokens, the flag table and the unified [`Options`] model.

pub mod env;
pub mod error;
pub mod flags;
pub mod login;
pub mod options;
pub mod token;

pub use env::{EnvSource, ProcessEnv};
pub use error::{Error, Result};
pub use flags::{Command, FlagId, FlagKind, FlagSpec, FLAGS};
pub use login::LoginMethod;
pub use options::Options;
pub use token::{AccessToken, AuthenticationRecord, TokenType};
