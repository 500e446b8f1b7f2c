//! Typed settings model and CLI/env/store/default precedence resolution for
//! `audiobook-organizer` (component §4.K).

pub mod error;
pub mod loader;
pub mod models;
pub mod secrets;
pub mod sources;

pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, Provenance, StoredSettings};
pub use models::{ConfigSource, DbType, Settings};
pub use secrets::{mask_secret, SecretCipher};
pub use sources::{CliConfig, EnvConfig, FileConfig};
