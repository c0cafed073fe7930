//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{on_pool, placeholders, page_offset, DynDatabasePool, LastInsertId};
use crate::models::{User, UserPreferences, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch several users at once; missing ids are skipped
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>>;

    /// Users whose first name, last name or email local part equals `token`
    async fn find_by_mention(&self, token: &str) -> Result<Vec<User>>;

    /// Search by name or email with pagination
    async fn search(&self, query: Option<&str>, page: i64, per_page: i64) -> Result<(Vec<User>, i64)>;

    /// Most recently registered users
    async fn list_recent(&self, limit: i64) -> Result<Vec<User>>;

    /// Update a user
    async fn update(&self, user: &User) -> Result<User>;

    /// Record activity (login, posting)
    async fn touch_activity(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    /// Delete a user
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// Count users whose account is active
    async fn count_active(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, email_public, bio, \
    avatar, role, is_active, preferences, last_activity_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    first_name: String,
    last_name: String,
    email: String,
    password_hash: String,
    email_public: bool,
    bio: Option<String>,
    avatar: Option<String>,
    role: String,
    is_active: bool,
    preferences: String,
    last_activity_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        let role = UserRole::from_str(&row.role)
            .with_context(|| format!("Invalid role '{}' for user {}", row.role, row.id))?;
        Ok(User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            password_hash: row.password_hash,
            email_public: row.email_public,
            bio: row.bio,
            avatar: row.avatar,
            role,
            is_active: row.is_active,
            preferences: UserPreferences::from_json(&row.preferences),
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_users(rows: Vec<UserRow>) -> Result<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let email = user.email.trim().to_lowercase();
        let preferences = serde_json::to_string(&user.preferences)?;
        let sql = r#"
            INSERT INTO users (first_name, last_name, email, password_hash, email_public, bio, avatar,
                               role, is_active, preferences, last_activity_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(&email)
                .bind(&user.password_hash)
                .bind(user.email_public)
                .bind(&user.bio)
                .bind(&user.avatar)
                .bind(user.role.to_string())
                .bind(user.is_active)
                .bind(&preferences)
                .bind(user.last_activity_at)
                .bind(now)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create user")?
                .insert_id()
        });

        Ok(User {
            id,
            email,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by ID")?
        });
        row.map(User::try_from).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let email = email.trim().to_lowercase();
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(&email)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by email")?
        });
        row.map(User::try_from).transpose()
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM users WHERE id IN ({})",
            USER_COLUMNS,
            placeholders(ids.len())
        );
        let rows = on_pool!(self.pool, conn => {
            let mut query = sqlx::query_as::<_, UserRow>(&sql);
            for id in ids {
                query = query.bind(*id);
            }
            query.fetch_all(conn).await.context("Failed to get users")?
        });
        into_users(rows)
    }

    async fn find_by_mention(&self, token: &str) -> Result<Vec<User>> {
        // SQL case folding is ASCII-only on SQLite, so names are compared here.
        let token = token.to_lowercase();
        let names = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, (i64, String, String, String)>(
                "SELECT id, first_name, last_name, email FROM users",
            )
            .fetch_all(conn)
            .await
            .context("Failed to look up mentioned users")?
        });

        let ids: Vec<i64> = names
            .into_iter()
            .filter(|(_, first, last, email)| {
                first.to_lowercase() == token
                    || last.to_lowercase() == token
                    || email.split('@').next().map(str::to_lowercase).as_deref() == Some(token.as_str())
            })
            .map(|(id, ..)| id)
            .collect();
        self.get_many(&ids).await
    }

    async fn search(&self, query: Option<&str>, page: i64, per_page: i64) -> Result<(Vec<User>, i64)> {
        let offset = page_offset(page, per_page);
        let pattern = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| format!("%{}%", q));
        let filter = if pattern.is_some() {
            "WHERE first_name LIKE ? OR last_name LIKE ? OR email LIKE ?"
        } else {
            ""
        };
        let list_sql = format!(
            "SELECT {} FROM users {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS, filter
        );
        let count_sql = format!("SELECT COUNT(*) FROM users {}", filter);

        let (rows, total) = on_pool!(self.pool, conn => {
            let mut list = sqlx::query_as::<_, UserRow>(&list_sql);
            let mut count = sqlx::query_scalar::<_, i64>(&count_sql);
            if let Some(pattern) = &pattern {
                for _ in 0..3 {
                    list = list.bind(pattern.clone());
                    count = count.bind(pattern.clone());
                }
            }
            let rows = list
                .bind(per_page)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to search users")?;
            let total = count.fetch_one(conn).await.context("Failed to count users")?;
            (rows, total)
        });

        Ok((into_users(rows)?, total))
    }

    async fn list_recent(&self, limit: i64) -> Result<Vec<User>> {
        let sql = format!(
            "SELECT {} FROM users ORDER BY created_at DESC, id DESC LIMIT ?",
            USER_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(limit)
                .fetch_all(conn)
                .await
                .context("Failed to list recent users")?
        });
        into_users(rows)
    }

    async fn update(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let preferences = serde_json::to_string(&user.preferences)?;
        let sql = r#"
            UPDATE users
            SET first_name = ?, last_name = ?, email = ?, password_hash = ?, email_public = ?,
                bio = ?, avatar = ?, role = ?, is_active = ?, preferences = ?, updated_at = ?
            WHERE id = ?
        "#;

        on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(user.email.trim().to_lowercase())
                .bind(&user.password_hash)
                .bind(user.email_public)
                .bind(&user.bio)
                .bind(&user.avatar)
                .bind(user.role.to_string())
                .bind(user.is_active)
                .bind(&preferences)
                .bind(now)
                .bind(user.id)
                .execute(conn)
                .await
                .context("Failed to update user")?;
        });

        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn touch_activity(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE users SET last_activity_at = ? WHERE id = ?")
                .bind(at)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to record user activity")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete user")?;
        });
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(conn)
                .await
                .context("Failed to count users")?
        });
        Ok(count)
    }

    async fn count_active(&self) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = ?")
                .bind(true)
                .fetch_one(conn)
                .await
                .context("Failed to count active users")?
        });
        Ok(count)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    pub(crate) async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    pub(crate) fn test_user(first: &str, last: &str, email: &str) -> User {
        User::new(
            first.to_string(),
            last.to_string(),
            email.to_string(),
            "not-a-real-hash".to_string(),
            UserRole::User,
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&test_user("Ada", "Lovelace", "Ada@Example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.email, "ada@example.com");
        assert_eq!(created.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_get_user_roundtrip() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = test_user("Ada", "Lovelace", "ada@example.com");
        user.bio = Some("Analyst".to_string());
        user.preferences.theme = "dark".to_string();
        let created = repo.create(&user).await.expect("Failed to create user");

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(found.first_name, "Ada");
        assert_eq!(found.bio.as_deref(), Some("Analyst"));
        assert_eq!(found.preferences.theme, "dark");
        assert!(found.is_active);
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_by_email_is_case_insensitive() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("Ada", "Lovelace", "ada@example.com"))
            .await
            .unwrap();

        let found = repo.get_by_email(" ADA@example.COM ").await.unwrap();
        assert!(found.is_some());
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("Ada", "Lovelace", "ada@example.com"))
            .await
            .unwrap();

        let result = repo.create(&test_user("Other", "Person", "ADA@example.com")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_find_by_mention() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        repo.create(&test_user("Charles", "Babbage", "cb@example.com")).await.unwrap();
        repo.create(&test_user("Grace", "Hopper", "a1da@example.com")).await.unwrap();

        let found = repo.find_by_mention("ada").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_name, "Ada");

        let by_last = repo.find_by_mention("BABBAGE").await.unwrap();
        assert_eq!(by_last.len(), 1);

        let by_email = repo.find_by_mention("cb").await.unwrap();
        assert_eq!(by_email.len(), 1);
        assert_eq!(by_email[0].last_name, "Babbage");
    }

    #[tokio::test]
    async fn test_find_by_mention_folds_non_ascii_names() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("Анна", "Ёлкина", "anna@example.com")).await.unwrap();
        repo.create(&test_user("Zoë", "Ødegaard", "zoe@example.com")).await.unwrap();

        let by_first = repo.find_by_mention("анна").await.unwrap();
        assert_eq!(by_first.len(), 1);
        assert_eq!(by_first[0].email, "anna@example.com");

        assert_eq!(repo.find_by_mention("ЁЛКИНА").await.unwrap().len(), 1);
        assert_eq!(repo.find_by_mention("ZOË").await.unwrap().len(), 1);
        assert_eq!(repo.find_by_mention("ødegaard").await.unwrap().len(), 1);
        assert!(repo.find_by_mention("ann").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_counts() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&test_user("Member", &format!("Number{}", i), &format!("m{}@example.com", i)))
                .await
                .unwrap();
        }
        let mut inactive = test_user("Grace", "Hopper", "grace@example.com");
        inactive.is_active = false;
        repo.create(&inactive).await.unwrap();

        let (page, total) = repo.search(None, 1, 4).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 4);

        let (found, total) = repo.search(Some("hopper"), 1, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].first_name, "Grace");

        assert_eq!(repo.count().await.unwrap(), 6);
        assert_eq!(repo.count_active().await.unwrap(), 5);
        assert_eq!(repo.list_recent(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_touch_activity() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = repo
            .create(&test_user("Ada", "Lovelace", "ada@example.com"))
            .await
            .unwrap();

        user.role = UserRole::Moderator;
        user.is_active = false;
        user.avatar = Some("/uploads/avatars/a.png".to_string());
        let updated = repo.update(&user).await.unwrap();
        assert_eq!(updated.role, UserRole::Moderator);
        assert!(!updated.is_active);
        assert_eq!(updated.avatar.as_deref(), Some("/uploads/avatars/a.png"));

        let now = Utc::now();
        repo.touch_activity(user.id, now).await.unwrap();
        let found = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(found.last_activity_at.is_some());
    }

    #[tokio::test]
    async fn test_get_many_and_delete() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create(&test_user("A", "One", "a@example.com")).await.unwrap();
        let b = repo.create(&test_user("B", "Two", "b@example.com")).await.unwrap();

        let users = repo.get_many(&[a.id, b.id, 999]).await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(repo.get_many(&[]).await.unwrap().is_empty());

        repo.delete(a.id).await.unwrap();
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
    }
}
