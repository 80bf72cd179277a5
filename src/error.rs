use uuid::Uuid;

use crate::models::InterventionStatus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("alert {0} is already resolved")]
    AlreadyResolved(Uuid),
    #[error("intervention cannot move from {from} to {to}")]
    InvalidTransition {
        from: InterventionStatus,
        to: InterventionStatus,
    },
    #[error("could not decode column {column}: {message}")]
    Decode {
        column: &'static str,
        message: String,
    },
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Returned by `FromStr` on the text-backed enums.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
