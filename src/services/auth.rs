//! Authentication and account activation service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{ActivateAccount, RequestContext, User, UserClaims},
    repository::Repository,
    services::redis::RedisService,
};

/// Length of activation tokens
pub const ACTIVATION_TOKEN_LEN: usize = 32;

/// Route a consumed activation link sends the reader to
pub const LOGIN_ROUTE: &str = "/login";

/// Generate a random alphanumeric activation token
pub fn generate_activation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ACTIVATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Hex SHA-256 of a token, kept after the token itself is cleared
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// What an activation link points at
#[derive(Debug)]
pub enum ActivationLookup {
    /// Account waiting for activation
    Pending(User),
    /// Token was already used; the reader should log in instead
    AlreadyActivated,
}

/// Result of submitting the activation form
#[derive(Debug)]
pub enum ActivationOutcome {
    /// Account activated and logged in
    Activated { token: String, user: User },
    AlreadyActivated,
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
    redis: RedisService,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig, redis: RedisService) -> Self {
        Self {
            repository,
            config,
            redis,
        }
    }

    /// Authenticate by email or matricula and return a JWT token.
    ///
    /// Failed attempts are counted per login; once locked, even the right
    /// password is refused until the lock expires.
    pub async fn login(&self, login: &str, password: &str) -> AppResult<(String, User)> {
        let key = login.trim().to_lowercase();

        if let Some(retry_after_secs) = self.redis.login_lockout_remaining(&key).await? {
            tracing::warn!(login = %key, retry_after_secs, "Login attempt while locked out");
            return Err(AppError::TooManyAttempts { retry_after_secs });
        }

        let user = self.repository.users_get_by_login(login.trim()).await?;
        let valid = match user {
            Some(ref user) => self.verify_password(user, password)?,
            None => false,
        };

        let user = match (valid, user) {
            (true, Some(user)) => user,
            _ => {
                let locked = self
                    .redis
                    .record_login_failure(&key, self.config.max_login_attempts, self.config.lockout_seconds)
                    .await?;
                if let Some(retry_after_secs) = locked {
                    tracing::warn!(login = %key, retry_after_secs, "Login locked after repeated failures");
                    return Err(AppError::TooManyAttempts { retry_after_secs });
                }
                return Err(AppError::Authentication("Invalid login or password".to_string()));
            }
        };

        if !user.status {
            return Err(AppError::Authentication("Account is not activated".to_string()));
        }

        self.redis.clear_login_failures(&key).await?;
        let token = self.create_token_for_user(&user)?;

        tracing::info!(user_id = user.id, role = %user.role, "User logged in");
        Ok((token, user))
    }

    /// Current user of a request
    pub async fn me(&self, ctx: &RequestContext) -> AppResult<User> {
        self.repository.users_get_by_id(ctx.user_id).await
    }

    /// Resolve an activation link
    pub async fn show_activation(&self, token: &str) -> AppResult<ActivationLookup> {
        if let Some(user) = self.repository.users_get_by_activation_token(token).await? {
            return Ok(ActivationLookup::Pending(user));
        }

        match self.repository.users_get_by_token_digest(&token_digest(token)).await? {
            Some(user) if user.status => Ok(ActivationLookup::AlreadyActivated),
            _ => Err(AppError::NotFound("Activation link is invalid".to_string())),
        }
    }

    /// Complete an activation: set the profile and password, then log the user in
    pub async fn activate(&self, token: &str, form: ActivateAccount) -> AppResult<ActivationOutcome> {
        let user = match self.show_activation(token).await? {
            ActivationLookup::Pending(user) => user,
            ActivationLookup::AlreadyActivated => return Ok(ActivationOutcome::AlreadyActivated),
        };

        form.validate()?;

        let email = form.email.trim().to_lowercase();
        if self
            .repository
            .users_identity_exists(None, Some(&email), Some(user.id))
            .await?
        {
            return Err(AppError::Conflict("Email address is already in use".to_string()));
        }

        let password_hash = self.hash_password(&form.password)?;
        let user = self
            .repository
            .users_activate(user.id, form.name.trim(), &email, &password_hash, &token_digest(token))
            .await?;

        let jwt = self.create_token_for_user(&user)?;

        tracing::info!(user_id = user.id, role = %user.role, "Account activated");
        Ok(ActivationOutcome::Activated { token: jwt, user })
    }

    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.matricula.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        if let Some(ref hash) = user.password {
            let parsed_hash = PasswordHash::new(hash)
                .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
            return Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok());
        }

        Ok(false)
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_tokens_are_32_alphanumerics() {
        let token = generate_activation_token();
        assert_eq!(token.len(), ACTIVATION_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_activation_token());
    }

    #[test]
    fn digest_is_stable_hex_sha256() {
        let token = generate_activation_token();
        let digest = token_digest(&token);
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, token_digest(&token));
        assert_ne!(digest, token_digest(&generate_activation_token()));
        assert_eq!(
            token_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
