use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {reason} (symbols: {})", .symbols.join(", "))]
    InsufficientData {
        reason: String,
        symbols: Vec<String>,
    },

    #[error("Optimization failed after {attempts} attempt(s): {message}")]
    Optimization { message: String, attempts: u32 },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AllocationError {
    pub(crate) fn insufficient(reason: impl Into<String>, symbols: Vec<String>) -> Self {
        AllocationError::InsufficientData {
            reason: reason.into(),
            symbols,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AllocationError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for AllocationError {
    fn from(e: serde_json::Error) -> Self {
        AllocationError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_lists_symbols() {
        let err = AllocationError::insufficient(
            "no observations",
            vec!["AAPL".into(), "MSFT".into()],
        );
        assert_eq!(
            err.to_string(),
            "Insufficient data: no observations (symbols: AAPL, MSFT)"
        );
    }

    #[test]
    fn test_optimization_error_carries_message() {
        let err = AllocationError::Optimization {
            message: "Inequality constraints incompatible".into(),
            attempts: 2,
        };
        assert!(err.to_string().contains("2 attempt(s)"));
        assert!(err.to_string().contains("Inequality constraints incompatible"));
    }
}
