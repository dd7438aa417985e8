use crate::error::KeywayError;
use crate::secret::{CredentialSource, SecretResolver};
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// A typed credential payload with its own required-field checks.
pub trait CredentialRecord: DeserializeOwned + Send + Sync + 'static {
    /// Short name used in logs and parse errors.
    const KIND: &'static str;

    /// Report the first empty required field, in a fixed order.
    fn validate(&self) -> Result<(), KeywayError>;
}

/// Returns `Validation` naming the first field whose value is empty.
pub(crate) fn require_non_empty(fields: &[(&'static str, &str)]) -> Result<(), KeywayError> {
    match fields.iter().find(|(_, value)| value.is_empty()) {
        Some(&(field, _)) => Err(KeywayError::Validation { field }),
        None => Ok(()),
    }
}

/// Resolves, parses and validates credentials at most once per instance.
///
/// The cell only becomes populated after every stage succeeds; a failed
/// attempt leaves it empty so the next caller starts over. Concurrent first
/// callers queue on the cell and observe the single successful load.
#[derive(Debug)]
pub struct CredentialLoader<T> {
    resolver: SecretResolver,
    cell: OnceCell<T>,
}

impl<T: CredentialRecord> CredentialLoader<T> {
    pub fn new(resolver: SecretResolver) -> Self {
        Self {
            resolver,
            cell: OnceCell::new(),
        }
    }

    pub fn resolver(&self) -> &SecretResolver {
        &self.resolver
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// The source the next load attempt would read from.
    pub fn source(&self) -> Result<CredentialSource, KeywayError> {
        self.resolver.source()
    }

    pub async fn ensure_loaded(&self) -> Result<&T, KeywayError> {
        self.cell
            .get_or_try_init(|| async {
                self.load()
                    .await
                    .inspect_err(|e| warn!(kind = T::KIND, error = %e, "credential load failed"))
            })
            .await
    }

    async fn load(&self) -> Result<T, KeywayError> {
        let source = self.resolver.source()?;
        let data = self.resolver.resolve().await?;
        let record: T = serde_json::from_slice(&data).map_err(|source| KeywayError::Parse {
            kind: T::KIND,
            source,
        })?;
        record.validate()?;
        info!(kind = T::KIND, source = %source, "credentials loaded");
        Ok(record)
    }
}
