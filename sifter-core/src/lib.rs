//! Sifter core library: domain types, the in-memory sifter registry, config.
//!
//! - [`types`]: identifiers, [`Sifter`] and its [`SyncState`]
//! - [`registry`]: [`SifterRegistry`] and immutable [`Snapshot`]s
//! - [`config`]: `~/.sifter/config.yaml` and the seed sifter list
//! - [`error`]: [`RegistryError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use config::{SeedSifter, SessionConfig};
pub use error::{ConfigError, RegistryError};
pub use registry::{SifterRegistry, Snapshot};
pub use types::{Sifter, SifterId, SifterName, SyncState};
