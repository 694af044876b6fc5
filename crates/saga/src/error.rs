//! Saga error types.

use thiserror::Error;

/// Errors raised by the registration ports and the saga internals.
///
/// A port returning `Err` is that port's failure envelope. The saga matches on
/// those explicitly; anything that reaches `?` propagation is treated as an
/// unexpected fault and handled by the saga-level safety net.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The CRM reported a business failure or could not be reached.
    #[error("CRM service error: {0}")]
    Crm(String),

    /// The identity system reported a failure; the payload is its error description.
    #[error("Identity service error: {0}")]
    Identity(String),

    /// A payload could not be transformed into the CRM request shape.
    #[error("Transformation error: {0}")]
    Transformation(String),

    /// A remote call succeeded but its payload lacked a mandatory field.
    #[error("Malformed {operation} response: {reason}")]
    MalformedResponse {
        operation: &'static str,
        reason: String,
    },

    /// Transport-level failure talking to a remote system.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A step panicked and the panic was caught.
    #[error("Step panicked: {0}")]
    Panicked(String),
}

impl SagaError {
    pub(crate) fn malformed(operation: &'static str, reason: impl Into<String>) -> Self {
        SagaError::MalformedResponse {
            operation,
            reason: reason.into(),
        }
    }

    /// Builds a [`SagaError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        SagaError::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_panic_reads_str_payload() {
        let err = SagaError::from_panic(Box::new("boom"));
        assert!(matches!(err, SagaError::Panicked(ref m) if m == "boom"));
    }

    #[test]
    fn test_from_panic_reads_string_payload() {
        let err = SagaError::from_panic(Box::new(String::from("index out of bounds")));
        assert_eq!(err.to_string(), "Step panicked: index out of bounds");
    }

    #[test]
    fn test_from_panic_tolerates_other_payloads() {
        let err = SagaError::from_panic(Box::new(42_u32));
        assert!(matches!(err, SagaError::Panicked(_)));
    }
}
