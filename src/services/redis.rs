//! Redis service for login attempt counters and lockouts

use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

fn attempts_key(login: &str) -> String {
    format!("login:attempts:{}", login)
}

fn lock_key(login: &str) -> String {
    format!("login:lock:{}", login)
}

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Seconds left on a login lockout, if the login is locked
    pub async fn login_lockout_remaining(&self, login: &str) -> AppResult<Option<u64>> {
        let mut conn = self.connection().await?;

        let ttl: i64 = conn
            .ttl(lock_key(login))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read login lock from Redis: {}", e)))?;

        // -2: no key, -1: key without expiry (never set by us)
        Ok((ttl > 0).then_some(ttl as u64))
    }

    /// Count a failed login. Once `max_attempts` is reached the login is locked
    /// for `lockout_seconds` and the lock duration is returned.
    pub async fn record_login_failure(
        &self,
        login: &str,
        max_attempts: u32,
        lockout_seconds: u64,
    ) -> AppResult<Option<u64>> {
        let mut conn = self.connection().await?;
        let key = attempts_key(login);

        let attempts: u32 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count login attempt in Redis: {}", e)))?;

        if attempts == 1 {
            conn.expire::<_, ()>(&key, lockout_seconds as i64)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to expire login attempts in Redis: {}", e)))?;
        }

        if attempts < max_attempts {
            return Ok(None);
        }

        conn.set_ex::<_, _, ()>(lock_key(login), attempts, lockout_seconds)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store login lock in Redis: {}", e)))?;
        conn.del::<_, ()>(&key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to reset login attempts in Redis: {}", e)))?;

        Ok(Some(lockout_seconds))
    }

    /// Forget failed attempts after a successful login
    pub async fn clear_login_failures(&self, login: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;

        conn.del::<_, ()>(vec![attempts_key(login), lock_key(login)])
            .await
            .map_err(|e| AppError::Internal(format!("Failed to clear login attempts in Redis: {}", e)))?;

        Ok(())
    }

    /// Check that Redis answers
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis ping failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_login() {
        assert_eq!(attempts_key("a0123"), "login:attempts:a0123");
        assert_eq!(lock_key("ana@example.org"), "login:lock:ana@example.org");
    }
}
