//! App repository
//!
//! Stores mini-app registrations. Only the hash of an app secret is kept.

use crate::db::{on_pool, page_offset, DynDatabasePool, LastInsertId};
use crate::models::{App, AppPermission};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::sync::Arc;

/// App repository trait
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Insert an app (id and `created_at` are assigned here)
    async fn create(&self, app: &App) -> Result<App>;

    async fn get_by_id(&self, id: i64) -> Result<Option<App>>;

    /// Look an app up by its public key
    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<App>>;

    /// An owner's apps, newest first
    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<App>>;

    async fn count_by_owner(&self, owner_id: i64) -> Result<i64>;

    /// Every app across owners, newest first, with the total
    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<App>, i64)>;

    async fn count(&self) -> Result<i64>;

    /// Persist name, description, permissions and active flag
    async fn update(&self, app: &App) -> Result<App>;

    /// Replace the key and secret hash
    async fn update_credentials(&self, id: i64, api_key: &str, api_secret_hash: &str) -> Result<()>;

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

pub struct SqlxAppRepository {
    pool: DynDatabasePool,
}

impl SqlxAppRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AppRepository> {
        Arc::new(Self::new(pool))
    }
}

const APP_COLUMNS: &str = "id, name, description, owner_id, api_key, api_secret_hash, permissions, \
    is_active, rate_limit, created_at, last_used_at";

#[derive(sqlx::FromRow)]
struct AppRow {
    id: i64,
    name: String,
    description: Option<String>,
    owner_id: i64,
    api_key: String,
    api_secret_hash: String,
    permissions: String,
    is_active: bool,
    rate_limit: i64,
    created_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl TryFrom<AppRow> for App {
    type Error = anyhow::Error;

    fn try_from(row: AppRow) -> Result<Self> {
        let raw: Vec<String> = serde_json::from_str(&row.permissions)
            .with_context(|| format!("Invalid permissions on app {}", row.id))?;
        let permissions = raw
            .iter()
            .map(|p| AppPermission::from_str(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(App {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            api_key: row.api_key,
            api_secret_hash: row.api_secret_hash,
            permissions,
            is_active: row.is_active,
            rate_limit: row.rate_limit,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
    }
}

fn permissions_json(permissions: &[AppPermission]) -> Result<String> {
    Ok(serde_json::to_string(permissions)?)
}

#[async_trait]
impl AppRepository for SqlxAppRepository {
    async fn create(&self, app: &App) -> Result<App> {
        let now = Utc::now();
        let permissions = permissions_json(&app.permissions)?;
        let sql = r#"
            INSERT INTO apps (name, description, owner_id, api_key, api_secret_hash, permissions,
                              is_active, rate_limit, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let id = on_pool!(self.pool, conn => {
            sqlx::query(sql)
                .bind(&app.name)
                .bind(&app.description)
                .bind(app.owner_id)
                .bind(&app.api_key)
                .bind(&app.api_secret_hash)
                .bind(&permissions)
                .bind(app.is_active)
                .bind(app.rate_limit)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create app")?
                .insert_id()
        });

        Ok(App {
            id,
            created_at: now,
            last_used_at: None,
            ..app.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<App>> {
        let sql = format!("SELECT {} FROM apps WHERE id = ?", APP_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, AppRow>(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get app")?
        });
        row.map(App::try_from).transpose()
    }

    async fn get_by_api_key(&self, api_key: &str) -> Result<Option<App>> {
        let sql = format!("SELECT {} FROM apps WHERE api_key = ?", APP_COLUMNS);
        let row = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, AppRow>(&sql)
                .bind(api_key)
                .fetch_optional(conn)
                .await
                .context("Failed to get app by key")?
        });
        row.map(App::try_from).transpose()
    }

    async fn list_by_owner(&self, owner_id: i64) -> Result<Vec<App>> {
        let sql = format!(
            "SELECT {} FROM apps WHERE owner_id = ? ORDER BY created_at DESC, id DESC",
            APP_COLUMNS
        );
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, AppRow>(&sql)
                .bind(owner_id)
                .fetch_all(conn)
                .await
                .context("Failed to list apps")?
        });
        rows.into_iter().map(App::try_from).collect()
    }

    async fn count_by_owner(&self, owner_id: i64) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apps WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_one(conn)
                .await
                .context("Failed to count apps")?
        });
        Ok(count)
    }

    async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<App>, i64)> {
        let sql = format!(
            "SELECT {} FROM apps ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            APP_COLUMNS
        );
        let offset = page_offset(page, per_page);
        let rows = on_pool!(self.pool, conn => {
            sqlx::query_as::<_, AppRow>(&sql)
                .bind(per_page)
                .bind(offset)
                .fetch_all(conn)
                .await
                .context("Failed to list apps")?
        });
        let apps = rows.into_iter().map(App::try_from).collect::<Result<Vec<_>>>()?;
        Ok((apps, self.count().await?))
    }

    async fn count(&self) -> Result<i64> {
        let count = on_pool!(self.pool, conn => {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM apps")
                .fetch_one(conn)
                .await
                .context("Failed to count apps")?
        });
        Ok(count)
    }

    async fn update(&self, app: &App) -> Result<App> {
        let permissions = permissions_json(&app.permissions)?;
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE apps SET name = ?, description = ?, permissions = ?, is_active = ? WHERE id = ?")
                .bind(&app.name)
                .bind(&app.description)
                .bind(&permissions)
                .bind(app.is_active)
                .bind(app.id)
                .execute(conn)
                .await
                .context("Failed to update app")?;
        });
        self.get_by_id(app.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("App not found after update"))
    }

    async fn update_credentials(&self, id: i64, api_key: &str, api_secret_hash: &str) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE apps SET api_key = ?, api_secret_hash = ? WHERE id = ?")
                .bind(api_key)
                .bind(api_secret_hash)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update app credentials")?;
        });
        Ok(())
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("UPDATE apps SET last_used_at = ? WHERE id = ?")
                .bind(at)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to record app usage")?;
        });
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_pool!(self.pool, conn => {
            sqlx::query("DELETE FROM apps WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete app")?;
        });
        Ok(())
    }
}
