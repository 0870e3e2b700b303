use crate::{error::AbsenceError, model::role::Role};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Authenticated caller, placed in request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,
}

impl FromRequest for AuthUser {
    type Error = AbsenceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| AbsenceError::Unauthorized("Missing token".to_string())),
        )
    }
}

impl AuthUser {
    pub fn require_hr_or_admin(&self) -> Result<(), AbsenceError> {
        if self.role.manages_absences() {
            Ok(())
        } else {
            Err(AbsenceError::Forbidden("HR/Admin only".to_string()))
        }
    }

    /// Allows HR/Admin for anyone, everybody else only for their own records.
    pub fn require_self_or_hr(&self, user_id: u64) -> Result<(), AbsenceError> {
        if self.user_id == user_id || self.role.manages_absences() {
            Ok(())
        } else {
            Err(AbsenceError::Forbidden(
                "Not allowed to access absences of another user".to_string(),
            ))
        }
    }
}
