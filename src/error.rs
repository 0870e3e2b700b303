use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use sqlx::error::ErrorKind;

/// Every endpoint, login included, fails with this type, so status mapping lives in one place.
#[derive(Debug, Display)]
pub enum AbsenceError {
    #[display(fmt = "{}", _0)]
    BadRequest(String),
    #[display(fmt = "{}", _0)]
    Unauthorized(String),
    #[display(fmt = "{}", _0)]
    Forbidden(String),
    #[display(fmt = "{}", _0)]
    NotFound(String),
    #[display(fmt = "{}", _0)]
    Conflict(String),
    #[display(fmt = "Upload exceeds the limit of {} bytes", _0)]
    PayloadTooLarge(usize),
    #[display(fmt = "Storage error: {}", _0)]
    Storage(std::io::Error),
    #[display(fmt = "Database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "Token error: {}", _0)]
    Token(jsonwebtoken::errors::Error),
}

impl AbsenceError {
    pub fn not_found(id: u64) -> Self {
        AbsenceError::NotFound(format!("Absence {id} not found"))
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AbsenceError::BadRequest(msg.into())
    }
}

impl ResponseError for AbsenceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AbsenceError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AbsenceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AbsenceError::Forbidden(_) => StatusCode::FORBIDDEN,
            AbsenceError::NotFound(_) => StatusCode::NOT_FOUND,
            AbsenceError::Conflict(_) => StatusCode::CONFLICT,
            AbsenceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AbsenceError::Storage(_) | AbsenceError::Database(_) | AbsenceError::Token(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // internal details stay in the log
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal Server Error".to_string()
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
            self.to_string()
        };

        HttpResponse::build(status).json(json!({ "message": message }))
    }
}

/// Client-facing error for a violated constraint; MySQL reports 1062 as a
/// unique violation and 1451/1452 as foreign key violations.
fn constraint_error(kind: ErrorKind) -> Option<AbsenceError> {
    match kind {
        ErrorKind::UniqueViolation => {
            Some(AbsenceError::Conflict("Absence already exists".to_string()))
        }
        ErrorKind::ForeignKeyViolation => {
            Some(AbsenceError::NotFound("Referenced user not found".to_string()))
        }
        _ => None,
    }
}

impl From<sqlx::Error> for AbsenceError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if let Some(mapped) = constraint_error(db_err.kind()) {
                return mapped;
            }
        }
        AbsenceError::Database(e)
    }
}

impl From<jsonwebtoken::errors::Error> for AbsenceError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        AbsenceError::Token(e)
    }
}

impl From<std::io::Error> for AbsenceError {
    fn from(e: std::io::Error) -> Self {
        AbsenceError::Storage(e)
    }
}
