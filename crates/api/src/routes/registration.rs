//! Registration endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use common::RegistrationRequest;
use saga::{CrmService, IdentityService, RegistrationSaga, SagaOutcome, Transformer};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<C, I, T>
where
    C: CrmService,
    I: IdentityService + 'static,
    T: Transformer,
{
    pub saga: RegistrationSaga<C, I, T>,
    /// Bearer token presented to the CRM on every call.
    pub crm_auth_token: String,
}

/// POST /register — runs the registration saga.
///
/// Saga failures are not HTTP errors: they come back as a [`SagaOutcome`]
/// with a 401 status. Only unparseable or incomplete requests are rejected
/// up front.
pub async fn register<C, I, T>(
    State(state): State<Arc<AppState<C, I, T>>>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SagaOutcome>), ApiError>
where
    C: CrmService + 'static,
    I: IdentityService + 'static,
    T: Transformer + 'static,
{
    let Json(request) = payload?;
    validate(&request)?;

    let outcome = state.saga.register(&request, &state.crm_auth_token).await;
    let status =
        StatusCode::from_u16(outcome.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(outcome)))
}

fn validate(request: &RegistrationRequest) -> Result<(), ApiError> {
    if request.brand_name.trim().is_empty() {
        return Err(ApiError::BadRequest("brandName is required".to_string()));
    }
    if request.email.trim().is_empty() {
        return Err(ApiError::BadRequest("email is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_brand_and_email() {
        assert!(validate(&RegistrationRequest::new("gi", "a@b.com")).is_ok());
        assert!(matches!(
            validate(&RegistrationRequest::new(" ", "a@b.com")),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate(&RegistrationRequest::new("gi", "")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
