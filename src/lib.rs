pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod query;
pub mod search;
pub mod storage;
pub mod vault;

pub use config::{Settings, VaultConfig};
pub use error::{Error, Result};
pub use events::VaultEvent;
pub use vault::Vault;
