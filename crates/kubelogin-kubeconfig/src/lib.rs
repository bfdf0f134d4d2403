//! Kubeconfig handling for kubelogin: a lossless document model, the
//! kubectl loading rules, and conversion of Azure users to exec stanzas.

pub mod convert;
pub mod loader;
pub mod model;

pub use convert::{Conversion, convert, convert_kubeconfig};
pub use loader::{KubeconfigFile, KubeconfigSet, LoadingRules, save};
pub use model::{AuthInfo, AuthProviderConfig, ExecConfig, ExecEnvVar, Kubeconfig};
