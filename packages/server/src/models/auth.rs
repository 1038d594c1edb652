use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::policy::Role;

/// Request body for creating a staff account.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    /// Login email; stored lowercased.
    #[schema(example = "maria@venue.test")]
    pub email: String,
    /// Display name (1-255 characters).
    #[schema(example = "Maria")]
    pub name: String,
    /// Password (8-128 characters).
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
    pub role: Role,
}

pub fn validate_register_request(payload: &RegisterRequest) -> Result<(), AppError> {
    validate_email(&payload.email)?;
    let name = payload.name.trim();
    if name.is_empty() || name.chars().count() > 255 {
        return Err(AppError::Validation("Name must be 1-255 characters".into()));
    }
    if payload.password.len() < 8 || payload.password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be 8-128 characters".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let well_formed = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(AppError::Validation("Email address is not valid".into()));
    }
    Ok(())
}

/// Request body for login.
#[derive(Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    #[schema(example = "maria@venue.test")]
    pub email: String,
    #[schema(example = "s3cure_P@ss!")]
    pub password: String,
}

pub fn validate_login_request(payload: &LoginRequest) -> Result<(), AppError> {
    if payload.email.trim().is_empty() {
        return Err(AppError::Validation("Email must not be empty".into()));
    }
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    Ok(())
}

/// Newly created account.
#[derive(Serialize, utoipa::ToSchema)]
pub struct RegisterResponse {
    pub id: Uuid,
    #[schema(example = "maria@venue.test")]
    pub email: String,
    #[schema(example = "Maria")]
    pub name: String,
    #[schema(example = "MANAGER")]
    pub role: String,
}

impl From<crate::entity::user::Model> for RegisterResponse {
    fn from(user: crate::entity::user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        }
    }
}

/// Successful login response.
#[derive(Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token.
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub token: String,
    #[schema(example = "maria@venue.test")]
    pub email: String,
    #[schema(example = "MANAGER")]
    pub role: String,
}

/// Current authenticated user's profile.
#[derive(Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: Uuid,
    #[schema(example = "maria@venue.test")]
    pub email: String,
    #[schema(example = "MANAGER")]
    pub role: String,
    /// Operations the role is allowed to perform.
    #[schema(example = json!(["category:read", "category:create"]))]
    pub operations: Vec<&'static str>,
}
