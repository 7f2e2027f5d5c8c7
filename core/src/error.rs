use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the persistence gateway.
///
/// Database code works in `anyhow`; typed errors raised inside a transaction
/// are wrapped into `anyhow::Error` and recovered by the `From` impl below, so
/// a validation failure detected mid-transaction still reports as one.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid required fields. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// An encoded ingredient/step list could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Referenced recipe, user, or saved recipe does not exist for this owner.
    #[error("{0}")]
    NotFound(String),

    /// Mail, SMS, external recipe API, or image storage call failed.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Transaction-level failure. The transaction was rolled back.
    #[error("Persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(typed) => typed,
            Err(other) => Self::Persistence(other),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.into())
    }
}
