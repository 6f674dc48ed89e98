//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use serde::Serialize;
use social_core::{CrudError, RegistrationError};
use std::fmt::{Display, Formatter};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Registration(RegistrationError),
    /// Request body could not be read as the expected JSON shape.
    Rejected(JsonRejection),
    Pool(r2d2::Error),
    Worker(tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Registration(RegistrationError::EmailTaken(_))
            | Self::Registration(RegistrationError::Crud(CrudError::ConstraintViolation {
                ..
            })) => StatusCode::CONFLICT,
            Self::Registration(RegistrationError::Crud(CrudError::Programming(_))) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Rejected(rejection) => rejection.status(),
            Self::Registration(_) | Self::Pool(_) | Self::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration(err) => write!(f, "{err}"),
            Self::Rejected(rejection) => write!(f, "{}", rejection.body_text()),
            Self::Pool(err) => write!(f, "database unavailable: {err}"),
            Self::Worker(err) => write!(f, "request worker failed: {err}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<RegistrationError> for ApiError {
    fn from(value: RegistrationError) -> Self {
        Self::Registration(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::Rejected(value)
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(value: r2d2::Error) -> Self {
        Self::Pool(value)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Worker(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                "event=http_request module=api status=error http_status={} error={}",
                status.as_u16(),
                self
            );
        } else {
            warn!(
                "event=http_request module=api status=rejected http_status={}",
                status.as_u16()
            );
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::http::StatusCode;
    use social_core::{CrudError, HashError, RegistrationError};

    #[test]
    fn registration_errors_map_to_statuses() {
        let taken = ApiError::from(RegistrationError::EmailTaken("a@x.com".to_string()));
        assert_eq!(taken.status(), StatusCode::CONFLICT);

        let constraint = ApiError::from(RegistrationError::Crud(CrudError::ConstraintViolation {
            table: "users",
            message: "UNIQUE constraint failed: users.phone_number".to_string(),
        }));
        assert_eq!(constraint.status(), StatusCode::CONFLICT);

        let programming = ApiError::from(RegistrationError::Crud(CrudError::Programming(
            "users.phone_number expects integer".to_string(),
        )));
        assert_eq!(programming.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let hash = ApiError::from(RegistrationError::Hash(HashError::new("boom")));
        assert_eq!(hash.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let missing = ApiError::from(RegistrationError::Crud(CrudError::NotFound {
            table: "users",
            id: 1,
        }));
        assert_eq!(missing.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
