//! User administration service

use std::path::{Path, PathBuf};

use chrono::Utc;
use validator::Validate;

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
    models::{
        enums::Role,
        user::{CreateUser, RequestContext, UpdateUser, User, UserQuery, UserShort, UserWithActivation},
    },
    repository::Repository,
    services::{auth::generate_activation_token, email::EmailService},
};

/// Multipart field carrying the credential scan
pub const CREDENTIAL_FIELD: &str = "file";

/// File types accepted for a school credential scan
const CREDENTIAL_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

/// What first start has to do to leave the server with a usable administrator
#[derive(Debug, PartialEq, Eq)]
enum BootstrapStep {
    /// An active administrator exists
    Nothing,
    /// The bootstrap account exists but was never activated
    Reissue(i32),
    Create,
}

fn bootstrap_step(active_admins: i64, existing: Option<&User>) -> AppResult<BootstrapStep> {
    if active_admins > 0 {
        return Ok(BootstrapStep::Nothing);
    }
    match existing {
        None => Ok(BootstrapStep::Create),
        Some(user) if user.role == Role::Admin && !user.status => Ok(BootstrapStep::Reissue(user.id)),
        Some(user) => Err(AppError::Internal(format!(
            "Bootstrap matricula {} belongs to a {} account and no administrator is active",
            user.matricula, user.role
        ))),
    }
}

/// Lower-cased extension of an uploaded file name, when it is an accepted type
fn credential_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_lowercase();
    CREDENTIAL_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    email: EmailService,
    public_url: String,
    storage: StorageConfig,
}

impl UsersService {
    pub fn new(repository: Repository, email: EmailService, public_url: String, storage: StorageConfig) -> Self {
        Self {
            repository,
            email,
            public_url: public_url.trim_end_matches('/').to_string(),
            storage,
        }
    }

    /// List users. Librarians only see readers.
    pub async fn search_users(&self, ctx: &RequestContext, mut query: UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        ctx.require_staff()?;
        if ctx.role == Role::Librarian {
            query.role = Some(Role::ReaderPublic);
        }
        self.repository.users_search(&query).await
    }

    pub async fn get_user(&self, ctx: &RequestContext, id: i32) -> AppResult<User> {
        ctx.require_self_or_staff(id)?;
        let user = self.repository.users_get_by_id(id).await?;

        if ctx.role == Role::Librarian && user.role != Role::ReaderPublic && user.id != ctx.user_id {
            return Err(AppError::Authorization("Librarians can only view readers".to_string()));
        }

        Ok(user)
    }

    /// Create an inactive account and issue its activation link
    pub async fn create_user(&self, ctx: &RequestContext, mut data: CreateUser) -> AppResult<UserWithActivation> {
        ctx.require_admin()?;
        data.validate()?;

        data.matricula = data.matricula.trim().to_uppercase();
        data.email = data.email.map(|e| e.trim().to_lowercase());

        if self
            .repository
            .users_identity_exists(Some(&data.matricula), data.email.as_deref(), None)
            .await?
        {
            return Err(AppError::Conflict("Matricula or email already exists".to_string()));
        }

        let token = generate_activation_token();
        let user = self.repository.users_create(&data, &token).await?;

        tracing::info!(user_id = user.id, role = %user.role, created_by = ctx.user_id, "User created");
        self.issue_activation(user, &token).await
    }

    pub async fn update_user(&self, ctx: &RequestContext, id: i32, mut data: UpdateUser) -> AppResult<User> {
        ctx.require_admin()?;
        data.validate()?;

        data.matricula = data.matricula.map(|m| m.trim().to_uppercase());
        data.email = data.email.map(|e| e.trim().to_lowercase());

        let current = self.repository.users_get_by_id(id).await?;

        if (data.matricula.is_some() || data.email.is_some())
            && self
                .repository
                .users_identity_exists(data.matricula.as_deref(), data.email.as_deref(), Some(id))
                .await?
        {
            return Err(AppError::Conflict("Matricula or email already exists".to_string()));
        }

        let demoted = data.role.map(|r| r != Role::Admin).unwrap_or(false);
        let deactivated = data.status == Some(false);
        if current.role == Role::Admin && current.status && (demoted || deactivated) {
            self.ensure_other_admin_remains().await?;
        }

        let user = self.repository.users_update(id, &data).await?;
        tracing::info!(user_id = id, updated_by = ctx.user_id, "User updated");
        Ok(user)
    }

    /// Hard delete. Reservations and loans of the user are removed with it.
    pub async fn delete_user(&self, ctx: &RequestContext, id: i32) -> AppResult<()> {
        ctx.require_admin()?;

        if id == ctx.user_id {
            return Err(AppError::BusinessRule("You cannot delete your own account".to_string()));
        }

        let user = self.repository.users_get_by_id(id).await?;
        if user.role == Role::Admin && user.status {
            self.ensure_other_admin_remains().await?;
        }

        self.repository.users_delete(id).await?;
        tracing::info!(user_id = id, deleted_by = ctx.user_id, "User deleted");
        Ok(())
    }

    /// Issue a new activation token for an account that was never activated
    pub async fn regenerate_activation(&self, ctx: &RequestContext, id: i32) -> AppResult<UserWithActivation> {
        ctx.require_admin()?;

        let user = self.repository.users_get_by_id(id).await?;
        if user.status {
            return Err(AppError::BusinessRule("Account is already active".to_string()));
        }

        let token = generate_activation_token();
        let user = self.repository.users_reset_activation(id, &token).await?;

        tracing::info!(user_id = id, "Activation token regenerated");
        self.issue_activation(user, &token).await
    }

    /// Make sure an administrator can sign in on a fresh installation.
    ///
    /// While no administrator is active, the bootstrap account gets a fresh
    /// random activation token on every start. Returns the link to hand out.
    pub async fn ensure_bootstrap_admin(&self, matricula: &str) -> AppResult<Option<UserWithActivation>> {
        let matricula = matricula.trim().to_uppercase();
        let active_admins = self.repository.users_count_active_admins().await?;
        let existing = match active_admins {
            0 => self.repository.users_get_by_login(&matricula).await?,
            _ => None,
        };

        let token = generate_activation_token();
        let user = match bootstrap_step(active_admins, existing.as_ref())? {
            BootstrapStep::Nothing => return Ok(None),
            BootstrapStep::Reissue(id) => self.repository.users_reset_activation(id, &token).await?,
            BootstrapStep::Create => {
                let admin = CreateUser {
                    matricula,
                    role: Role::Admin,
                    name: Some("Administrator".to_string()),
                    email: None,
                };
                self.repository.users_create(&admin, &token).await?
            }
        };

        tracing::info!(user_id = user.id, "Bootstrap administrator awaiting activation");
        self.issue_activation(user, &token).await.map(Some)
    }

    /// Store the reader's credential scan; staff verify it afterwards
    pub async fn upload_credential(
        &self,
        ctx: &RequestContext,
        file_name: &str,
        content: &[u8],
    ) -> AppResult<User> {
        if content.is_empty() {
            return Err(AppError::validation(CREDENTIAL_FIELD, "Credential file is empty"));
        }
        if content.len() > self.storage.max_credential_bytes {
            return Err(AppError::validation(
                CREDENTIAL_FIELD,
                format!("Credential file exceeds {} bytes", self.storage.max_credential_bytes),
            ));
        }
        let ext = credential_extension(file_name).ok_or_else(|| {
            AppError::validation(
                CREDENTIAL_FIELD,
                format!("Credential must be one of: {}", CREDENTIAL_EXTENSIONS.join(", ")),
            )
        })?;

        let dir = PathBuf::from(&self.storage.credentials_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create credentials directory: {}", e)))?;

        let path = dir.join(format!("user_{}_{}.{}", ctx.user_id, Utc::now().timestamp(), ext));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store credential: {}", e)))?;

        let user = self
            .repository
            .users_set_credential_path(ctx.user_id, &path.to_string_lossy())
            .await?;

        tracing::info!(user_id = ctx.user_id, bytes = content.len(), "Credential uploaded");
        Ok(user)
    }

    async fn ensure_other_admin_remains(&self) -> AppResult<()> {
        if self.repository.users_count_active_admins().await? <= 1 {
            return Err(AppError::BusinessRule(
                "At least one active administrator must remain".to_string(),
            ));
        }
        Ok(())
    }

    async fn issue_activation(&self, user: User, token: &str) -> AppResult<UserWithActivation> {
        let activation_path = format!("/activate/{}", token);
        let activation_url = format!("{}{}", self.public_url, activation_path);

        let mut email_sent = false;
        if let (true, Some(to)) = (self.email.is_enabled(), user.email.as_deref()) {
            match self
                .email
                .send_activation_link(to, &user.matricula, &activation_url)
                .await
            {
                Ok(()) => email_sent = true,
                Err(e) => tracing::warn!(user_id = user.id, "Activation email not sent: {}", e),
            }
        }

        Ok(UserWithActivation {
            user,
            activation_path,
            activation_url,
            email_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_extensions_are_whitelisted() {
        assert_eq!(credential_extension("scan.PDF").as_deref(), Some("pdf"));
        assert_eq!(credential_extension("photo.jpeg").as_deref(), Some("jpeg"));
        assert!(credential_extension("script.sh").is_none());
        assert!(credential_extension("noext").is_none());
    }

    fn account(role: Role, status: bool) -> User {
        let now = Utc::now();
        User {
            id: 1,
            name: None,
            email: None,
            password: None,
            role,
            status,
            matricula: "ADMIN-0001".into(),
            activation_token: None,
            activation_token_digest: None,
            school_credential_path: None,
            credential_verified_at: None,
            verified_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn bootstrap_only_acts_without_an_active_admin() {
        assert_eq!(bootstrap_step(1, None).unwrap(), BootstrapStep::Nothing);
        assert_eq!(bootstrap_step(0, None).unwrap(), BootstrapStep::Create);
        assert_eq!(
            bootstrap_step(0, Some(&account(Role::Admin, false))).unwrap(),
            BootstrapStep::Reissue(1)
        );
        assert!(bootstrap_step(0, Some(&account(Role::Librarian, false))).is_err());
    }

    #[test]
    fn schema_seeds_no_accounts() {
        let schema = include_str!("../../migrations/20240101000000_initial_schema.sql");
        assert!(!schema.contains("INSERT INTO users"));
    }
}
