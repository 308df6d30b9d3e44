use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::{email_error, phone_error};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::User;

pub const ROLE_OWNER: &str = "owner";
pub const ROLE_CUSTOMER: &str = "customer";

#[derive(Deserialize, Debug, ToSchema)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl SignupRequest {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if self.username.trim().len() < 3 || self.username.len() > 150 {
            errors.push(FieldError::new(
                "username",
                "Username must be between 3 and 150 characters",
            ));
        }
        if let Some(err) = email_error("email", &self.email) {
            errors.push(err);
        }
        if self.password.len() < 8 {
            errors.push(FieldError::new(
                "password",
                "Password must be at least 8 characters",
            ));
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.is_empty()) {
            if let Some(err) = phone_error("phone", phone) {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LogoutRequest {
    pub refresh: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Some(email) = self.email.as_deref() {
            if let Some(err) = email_error("email", email) {
                errors.push(err);
            }
        }
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.is_empty()) {
            if let Some(err) = phone_error("phone", phone) {
                errors.push(err);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.new_password.len() < 8 {
            return Err(AppError::Validation(vec![FieldError::new(
                "new_password",
                "Password must be at least 8 characters",
            )]));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
    pub token_type: String,
    pub jti: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_collects_field_errors() {
        let request = SignupRequest {
            username: "ab".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            phone: Some("123".into()),
            address: None,
        };
        match request.validate() {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["username", "email", "password", "phone"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn signup_accepts_valid_payload() {
        let request = SignupRequest {
            username: "ferris".into(),
            email: "ferris@example.com".into(),
            password: "correct horse".into(),
            phone: Some("+4915112345678".into()),
            address: Some("1 Crab Lane".into()),
        };
        assert!(request.validate().is_ok());
    }
}
