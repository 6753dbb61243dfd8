//! User domain methods on Repository

use chrono::Utc;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{paginate, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::Role,
        user::{CreateUser, UpdateUser, User, UserQuery, UserShort},
    },
};

impl Repository {
    /// Get user by ID
    pub async fn users_get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by email or matricula (login identifier)
    pub async fn users_get_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE LOWER(email) = LOWER($1) OR LOWER(matricula) = LOWER($1)
            LIMIT 1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Get the user an outstanding activation token belongs to
    pub async fn users_get_by_activation_token(&self, token: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE activation_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Get the user who already consumed the token with this digest
    pub async fn users_get_by_token_digest(&self, digest: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE activation_token_digest = $1")
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Check if a matricula or email is already taken by another user
    pub async fn users_identity_exists(
        &self,
        matricula: Option<&str>,
        email: Option<&str>,
        exclude_id: Option<i32>,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE (LOWER(matricula) = LOWER($1) OR LOWER(email) = LOWER($2))
                  AND ($3::INTEGER IS NULL OR id != $3)
            )
            "#,
        )
        .bind(matricula)
        .bind(email)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Search users with pagination
    pub async fn users_search(&self, query: &UserQuery) -> AppResult<(Vec<UserShort>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page);

        fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a UserQuery) {
            builder.push(" WHERE TRUE");
            if let Some(ref search) = query.search {
                let pattern = format!("%{}%", search.trim().to_lowercase());
                builder
                    .push(" AND (LOWER(COALESCE(u.name, '')) LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR LOWER(COALESCE(u.email, '')) LIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR LOWER(u.matricula) LIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
            if let Some(role) = query.role {
                builder.push(" AND u.role = ").push_bind(role);
            }
            if let Some(status) = query.status {
                builder.push(" AND u.status = ").push_bind(status);
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users u");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r#"
            SELECT u.id, u.name, u.email, u.matricula, u.role, u.status,
                   (u.credential_verified_at IS NOT NULL) AS credential_verified,
                   (SELECT COUNT(*) FROM loans l
                     WHERE l.user_id = u.id AND l.status IN ('active', 'overdue')) AS active_loans
            FROM users u
            "#,
        );
        push_filters(&mut select, query);
        select
            .push(" ORDER BY u.name NULLS LAST, u.matricula LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let users = select.build_query_as::<UserShort>().fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    /// Create a new, inactive user holding an activation token
    pub async fn users_create(&self, user: &CreateUser, activation_token: &str) -> AppResult<User> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (matricula, role, name, email, status, activation_token)
            VALUES ($1, $2, $3, $4, FALSE, $5)
            RETURNING *
            "#,
        )
        .bind(&user.matricula)
        .bind(user.role)
        .bind(&user.name)
        .bind(&user.email)
        .bind(activation_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update an existing user
    pub async fn users_update(&self, id: i32, user: &UpdateUser) -> AppResult<User> {
        let now = Utc::now();

        let mut sets = vec!["updated_at = $1".to_string()];
        let mut param_idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(user.matricula, "matricula");
        add_field!(user.role, "role");
        add_field!(user.name, "name");
        add_field!(user.email, "email");
        add_field!(user.status, "status");

        let query = format!(
            "UPDATE users SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            param_idx
        );

        let mut builder = sqlx::query_as::<_, User>(&query).bind(now);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(user.matricula);
        bind_field!(user.role);
        bind_field!(user.name);
        bind_field!(user.email);
        bind_field!(user.status);

        builder
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Delete a user. Their reservations and loans go with them, while the
    /// loans and approvals they handled as staff keep a null reference.
    pub async fn users_delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        Ok(())
    }

    /// Complete activation: set the profile, consume the token and keep its digest
    pub async fn users_activate(
        &self,
        id: i32,
        name: &str,
        email: &str,
        password_hash: &str,
        token_digest: &str,
    ) -> AppResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET name = $1, email = $2, password = $3, status = TRUE,
                activation_token = NULL, activation_token_digest = $4, updated_at = $5
            WHERE id = $6 AND activation_token IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(token_digest)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("Account is already activated".to_string()))?;

        Ok(user)
    }

    /// Issue a fresh activation token and deactivate the account until it is used
    pub async fn users_reset_activation(&self, id: i32, activation_token: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET activation_token = $1, activation_token_digest = NULL, status = FALSE, updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(activation_token)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Store the path of an uploaded school credential; it must be verified again
    pub async fn users_set_credential_path(&self, id: i32, path: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET school_credential_path = $1, credential_verified_at = NULL, verified_by = NULL,
                updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(path)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Mark a user's school credential as verified
    pub async fn users_verify_credential(
        &self,
        conn: &mut PgConnection,
        id: i32,
        verified_by: i32,
    ) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET credential_verified_at = $1, verified_by = $2, updated_at = $1
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(verified_by)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Number of administrators that can still log in
    pub async fn users_count_active_admins(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1 AND status")
            .bind(Role::Admin)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
