pub mod credential_loader;

pub use credential_loader::{CredentialLoader, CredentialRecord};
