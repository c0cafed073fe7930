//! Login audit log

use crate::db::{on_pool, DynDatabasePool};
use crate::models::LoginAttempt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait LoginLogRepository: Send + Sync {
    /// Append one login attempt
    async fn record(&self, attempt: &LoginAttempt) -> Result<()>;
}

pub struct SqlxLoginLogRepository {
    pool: DynDatabasePool,
}

impl SqlxLoginLogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LoginLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LoginLogRepository for SqlxLoginLogRepository {
    async fn record(&self, attempt: &LoginAttempt) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query(
                "INSERT INTO login_logs (email, ip_address, success, failure_reason, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&attempt.email)
            .bind(&attempt.ip_address)
            .bind(attempt.success)
            .bind(&attempt.failure_reason)
            .bind(Utc::now())
            .execute(conn)
            .await
            .context("Failed to record login attempt")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    #[tokio::test]
    async fn test_record_attempts() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let repo = SqlxLoginLogRepository::new(pool.clone());

        repo.record(&LoginAttempt {
            email: "ada@example.com".to_string(),
            ip_address: Some("127.0.0.1".to_string()),
            success: false,
            failure_reason: Some("invalid_credentials".to_string()),
        })
        .await
        .expect("Failed to record attempt");

        let sqlite = pool.sqlite_pool().unwrap();
        let (count, failures): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(CASE WHEN success = 0 THEN 1 END) FROM login_logs",
        )
        .fetch_one(sqlite)
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(failures, 1);
    }
}
