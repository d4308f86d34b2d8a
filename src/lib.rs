use std::time::Duration;

use thiserror::Error;

/// Expose all controller components used by main
pub mod operator;
pub mod resources;

/// Operator configuration and image resolution
pub mod config;

/// Dependent resource templating
pub mod builders;

/// Access to the Kubernetes object graph
pub mod store;

/// The reconciliation pipeline
pub mod reconcilers;

/// Label selector evaluation
pub mod selector;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;
pub use metrics::Metrics;

/// Default field manager used for server-side apply and status patches.
pub const FIELD_OWNER: &str = "pgadmin-operator";

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("Conflict: {0}")]
    Conflict(#[source] kube::Error),

    #[error("Timed out after {0:?} waiting for the API server")]
    Timeout(Duration),

    #[error("Missing image for {0}; set spec.image or RELATED_IMAGE_STANDALONE_PGADMIN")]
    MissingImage(String),

    #[error("IllegalPGAdmin {0}: {1}")]
    IllegalPGAdmin(String, String),

    #[error("InvalidSelector: {0}")]
    InvalidSelector(String),

    #[error("Patching status failed: {0}")]
    StatusWrite(#[source] Box<Error>),

    /// A failed pass whose failure condition could not be written to status
    #[error("{0} (status not updated)")]
    Unreported(#[source] Box<Error>),
}
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<kube::Error> for Error {
    fn from(error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(response) if response.code == 409 => Error::Conflict(error),
            _ => Error::KubeError(error),
        }
    }
}

impl Error {
    pub fn metric_label(&self) -> String {
        self.reason().to_lowercase()
    }

    /// Errors that will not go away by retrying with the same spec
    ///
    /// An unreported failure is retried regardless, so its condition reaches the status.
    pub fn is_validation(&self) -> bool {
        match self {
            Error::MissingImage(_) | Error::IllegalPGAdmin(..) | Error::InvalidSelector(_) => true,
            Error::StatusWrite(inner) => inner.is_validation(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::StatusWrite(inner) | Error::Unreported(inner) => inner.is_conflict(),
            _ => false,
        }
    }

    /// A condition reason describing the class of this error
    pub fn reason(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationFailed",
            Error::KubeError(_) | Error::Timeout(_) => "StoreUnavailable",
            Error::Conflict(_) => "Conflict",
            Error::MissingImage(_) => "MissingImage",
            Error::IllegalPGAdmin(..) | Error::InvalidSelector(_) => "InvalidSpec",
            Error::StatusWrite(_) => "StatusWriteFailed",
            Error::Unreported(inner) => inner.reason(),
        }
    }
}
