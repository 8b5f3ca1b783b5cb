use thiserror::Error;

/// Failures reported by `Store` operations.
///
/// Both variants concern a single product; the store itself stays
/// consistent after either.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("product not found: {0}")]
    NotFound(String),

    #[error("failed to serialize product '{name}': {reason}")]
    Serialization { name: String, reason: String },
}
