//! User model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::Role;
use crate::error::{AppError, AppResult};

/// Institutional student/staff ID
pub static MATRICULA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]{2,31}$").expect("valid matricula regex"));

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub role: Role,
    /// Active flag, false until the account is activated
    pub status: bool,
    pub matricula: String,
    #[serde(skip_serializing)]
    pub activation_token: Option<String>,
    #[serde(skip_serializing)]
    pub activation_token_digest: Option<String>,
    pub school_credential_path: Option<String>,
    pub credential_verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_verified_credential(&self) -> bool {
        self.credential_verified_at.is_some()
    }
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub matricula: String,
    pub role: Role,
    pub status: bool,
    pub credential_verified: bool,
    pub active_loans: i64,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct UserQuery {
    /// Search in name, email and matricula
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Create user request (admin). The account starts inactive.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(regex(path = *MATRICULA_RE, message = "Matricula must be 3-32 letters, digits or dashes"))]
    pub matricula: String,
    pub role: Role,
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
}

/// Update user request (admin)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(regex(path = *MATRICULA_RE, message = "Matricula must be 3-32 letters, digits or dashes"))]
    pub matricula: Option<String>,
    pub role: Option<Role>,
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub status: Option<bool>,
}

/// User returned with a fresh activation link
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserWithActivation {
    #[serde(flatten)]
    pub user: User,
    /// Path of the activation page, relative to the public URL
    pub activation_path: String,
    pub activation_url: String,
    /// An activation e-mail was sent to the user
    pub email_sent: bool,
}

/// Pre-filled activation form for a pending account
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActivationInfo {
    pub matricula: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
}

impl From<&User> for ActivationInfo {
    fn from(user: &User) -> Self {
        Self {
            matricula: user.matricula.clone(),
            role: user.role,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// Account activation form
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ActivateAccount {
    #[validate(length(min = 2, max = 120, message = "Name must be 2-120 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,
}

/// JWT claims carried by every authenticated request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// Caller identity for one request, passed explicitly to every service call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i32,
    pub role: Role,
}

impl From<&UserClaims> for RequestContext {
    fn from(claims: &UserClaims) -> Self {
        Self {
            user_id: claims.user_id,
            role: claims.role,
        }
    }
}

impl RequestContext {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Librarian or admin role required".to_string()))
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::Authorization("Admin role required".to_string()))
        }
    }

    /// Readers may only act on their own records
    pub fn require_self_or_staff(&self, user_id: i32) -> AppResult<()> {
        if self.is_staff() || self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::Authorization("Not allowed to access another user's records".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn role_checks_on_request_context() {
        let reader = RequestContext { user_id: 5, role: Role::ReaderPublic };
        let librarian = RequestContext { user_id: 2, role: Role::Librarian };
        let admin = RequestContext { user_id: 1, role: Role::Admin };

        assert_err!(reader.require_staff());
        assert_ok!(reader.require_self_or_staff(5));
        assert_err!(reader.require_self_or_staff(6));

        assert_ok!(librarian.require_staff());
        assert_err!(librarian.require_admin());
        assert_ok!(librarian.require_self_or_staff(6));

        assert_ok!(admin.require_admin());
    }

    #[test]
    fn token_round_trip_keeps_role() {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: "A-1234".into(),
            user_id: 7,
            role: Role::Librarian,
            exp: now + 3600,
            iat: now,
        };

        let token = claims.create_token("secret").unwrap();
        let parsed = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(parsed.user_id, 7);
        assert_eq!(parsed.role, Role::Librarian);
        assert!(UserClaims::from_token(&token, "other").is_err());
    }

    #[test]
    fn activation_form_requires_matching_passwords() {
        let form = ActivateAccount {
            name: "Ana Ruiz".into(),
            email: "ana@example.org".into(),
            password: "correct horse".into(),
            password_confirmation: "correct hose".into(),
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password_confirmation"));
    }

    #[test]
    fn matricula_pattern() {
        assert!(MATRICULA_RE.is_match("A01234567"));
        assert!(MATRICULA_RE.is_match("ADMIN-0001"));
        assert!(!MATRICULA_RE.is_match("a"));
        assert!(!MATRICULA_RE.is_match("has space"));
    }
}
