// ⚠️ Engine Errors - Named failure conditions for the five analyses
//
// Callers get either a well-formed result (possibly empty) or one of these.
// "No qualifying rows" is NOT an error: it is an empty, successful result.

use crate::model::CategoryGroup;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntelError {
    /// Unknown candidate / municipality / election id
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Category group with a zero total (fractions undefined)
    #[error("municipality {municipality_id} has no voters recorded for {group}")]
    InvalidProfileData {
        municipality_id: i64,
        group: CategoryGroup,
    },

    /// Projection baseline is zero (growth factor undefined)
    #[error("insufficient historical data: {0}")]
    InvalidTarget(String),

    /// Malformed request parameter (unknown criterion, category, sort order)
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Storage collaborator failed
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl IntelError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        IntelError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IntelError::NotFound { .. })
    }
}

impl From<rusqlite::Error> for IntelError {
    fn from(err: rusqlite::Error) -> Self {
        IntelError::Storage(err.into())
    }
}

pub type IntelResult<T> = std::result::Result<T, IntelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = IntelError::not_found("candidate", 42);
        assert_eq!(err.to_string(), "candidate 42 not found");
        assert!(err.is_not_found());

        let err = IntelError::InvalidProfileData {
            municipality_id: 7,
            group: CategoryGroup::Gender,
        };
        assert_eq!(
            err.to_string(),
            "municipality 7 has no voters recorded for genero"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_storage_error_from_anyhow() {
        let err: IntelError = anyhow::anyhow!("disk on fire").into();
        assert!(matches!(err, IntelError::Storage(_)));
        assert!(err.to_string().contains("disk on fire"));
    }
}
