pub mod config;
pub mod db;
pub mod email;
pub mod error;
mod http;
pub mod secret;
pub mod service;

pub use config::{Config, FactoryConfig};
pub use db::DatabaseFactory;
pub use email::EmailFactory;
pub use error::KeywayError;
pub use secret::{CredentialSource, SecretManagerClient, SecretStore};
