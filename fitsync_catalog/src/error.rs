use thiserror::Error;

/// Catalog-layer failures. Any variant here is, per spec §7,
/// `CatalogCorruption` territory once it escapes the store — the
/// executor treats every [`CatalogError`] it sees as invocation-fatal.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid status transition for {fingerprint}: {from} -> {to}")]
    InvalidStatusTransition {
        fingerprint: String,
        from: String,
        to: String,
    },

    #[error("malformed catalog row: {0}")]
    MalformedRow(String),
}
