//! Mini-app registration and credential checks
//!
//! Each app gets an API key (64 hex chars) and a secret (128 hex chars). Only
//! the SHA-256 of the secret is stored; the plaintext is returned once, on
//! creation or regeneration.

use crate::db::repositories::AppRepository;
use crate::models::{
    App, AppCredentials, AppPermission, DEFAULT_APP_RATE_LIMIT, MAX_APPS_PER_USER,
    MAX_APP_DESCRIPTION_LENGTH, MAX_APP_NAME_LENGTH,
};
use crate::services::text::length_between;
use anyhow::Context;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::Utc;
use data_encoding::HEXLOWER;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::str::FromStr;
use subtle::ConstantTimeEq;
use std::sync::Arc;

const API_KEY_BYTES: usize = 32;
const API_SECRET_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum AppServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("App not found")]
    NotFound,

    #[error("Invalid API credentials")]
    InvalidCredentials,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAppInput {
    pub name: String,
    pub description: Option<String>,
    /// Permission strings such as `read:profile`
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

pub struct AppService {
    apps: Arc<dyn AppRepository>,
}

impl AppService {
    pub fn new(apps: Arc<dyn AppRepository>) -> Self {
        Self { apps }
    }

    /// Register an app; the returned credentials hold the only copy of the secret
    pub async fn create(&self, owner_id: i64, input: CreateAppInput) -> Result<(App, AppCredentials), AppServiceError> {
        validate_name(&input.name)?;
        let description = normalize_description(input.description)?;
        let permissions = match input.permissions {
            Some(list) => parse_permissions(&list)?,
            None => AppPermission::defaults(),
        };

        let owned = self
            .apps
            .count_by_owner(owner_id)
            .await
            .context("Failed to count apps")?;
        if owned >= MAX_APPS_PER_USER {
            return Err(AppServiceError::ValidationError(format!(
                "You can register at most {} apps",
                MAX_APPS_PER_USER
            )));
        }

        let credentials = generate_credentials();
        let draft = App {
            id: 0,
            name: input.name.trim().to_string(),
            description,
            owner_id,
            api_key: credentials.api_key.clone(),
            api_secret_hash: hash_secret(&credentials.api_secret),
            permissions,
            is_active: true,
            rate_limit: DEFAULT_APP_RATE_LIMIT,
            created_at: Utc::now(),
            last_used_at: None,
        };
        let app = self.apps.create(&draft).await.context("Failed to create app")?;
        tracing::info!("App {} registered by user {}", app.id, owner_id);

        Ok((app, credentials))
    }

    /// Fetch an app owned by `owner_id`; other owners' apps look missing
    pub async fn get(&self, owner_id: i64, id: i64) -> Result<App, AppServiceError> {
        self.apps
            .get_by_id(id)
            .await
            .context("Failed to get app")?
            .filter(|app| app.owner_id == owner_id)
            .ok_or(AppServiceError::NotFound)
    }

    pub async fn list(&self, owner_id: i64) -> Result<Vec<App>, AppServiceError> {
        Ok(self
            .apps
            .list_by_owner(owner_id)
            .await
            .context("Failed to list apps")?)
    }

    pub async fn update(&self, owner_id: i64, id: i64, input: UpdateAppInput) -> Result<App, AppServiceError> {
        let mut app = self.get(owner_id, id).await?;

        if let Some(name) = input.name {
            validate_name(&name)?;
            app.name = name.trim().to_string();
        }
        if input.description.is_some() {
            app.description = normalize_description(input.description)?;
        }
        if let Some(list) = input.permissions {
            app.permissions = parse_permissions(&list)?;
        }
        if let Some(active) = input.is_active {
            app.is_active = active;
        }

        Ok(self.apps.update(&app).await.context("Failed to update app")?)
    }

    pub async fn delete(&self, owner_id: i64, id: i64) -> Result<(), AppServiceError> {
        let app = self.get(owner_id, id).await?;
        self.apps.delete(app.id).await.context("Failed to delete app")?;
        Ok(())
    }

    /// Replace both key and secret; the old pair stops working immediately
    pub async fn regenerate_credentials(&self, owner_id: i64, id: i64) -> Result<AppCredentials, AppServiceError> {
        let app = self.get(owner_id, id).await?;
        let credentials = generate_credentials();
        self.apps
            .update_credentials(app.id, &credentials.api_key, &hash_secret(&credentials.api_secret))
            .await
            .context("Failed to store new credentials")?;
        Ok(credentials)
    }

    /// Resolve an active app from its key and secret
    pub async fn authenticate(&self, api_key: &str, api_secret: &str) -> Result<App, AppServiceError> {
        let mut app = self
            .apps
            .get_by_api_key(api_key)
            .await
            .context("Failed to look up app")?
            .filter(|app| app.is_active)
            .ok_or(AppServiceError::InvalidCredentials)?;

        let presented = hash_secret(api_secret);
        if !secret_hash_matches(&presented, &app.api_secret_hash) {
            return Err(AppServiceError::InvalidCredentials);
        }

        let now = Utc::now();
        if let Err(e) = self.apps.touch_last_used(app.id, now).await {
            tracing::warn!("Failed to record use of app {}: {}", app.id, e);
        } else {
            app.last_used_at = Some(now);
        }
        Ok(app)
    }

    pub fn has_permission(&self, app: &App, permission: AppPermission) -> bool {
        app.has_permission(permission)
    }

    pub async fn count(&self) -> Result<i64, AppServiceError> {
        Ok(self.apps.count().await.context("Failed to count apps")?)
    }
}

fn validate_name(name: &str) -> Result<(), AppServiceError> {
    if !length_between(name, 2, MAX_APP_NAME_LENGTH) {
        return Err(AppServiceError::ValidationError(format!(
            "App name must be between 2 and {} characters",
            MAX_APP_NAME_LENGTH
        )));
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Result<Option<String>, AppServiceError> {
    let description = description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if let Some(d) = &description {
        if d.chars().count() > MAX_APP_DESCRIPTION_LENGTH {
            return Err(AppServiceError::ValidationError(format!(
                "Description must be at most {} characters",
                MAX_APP_DESCRIPTION_LENGTH
            )));
        }
    }
    Ok(description)
}

fn parse_permissions(list: &[String]) -> Result<Vec<AppPermission>, AppServiceError> {
    let mut permissions = Vec::with_capacity(list.len());
    for raw in list {
        let permission = AppPermission::from_str(raw)
            .map_err(|_| AppServiceError::ValidationError(format!("Invalid permission: {}", raw)))?;
        if !permissions.contains(&permission) {
            permissions.push(permission);
        }
    }
    Ok(permissions)
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    HEXLOWER.encode(&bytes)
}

fn generate_credentials() -> AppCredentials {
    AppCredentials {
        api_key: random_hex(API_KEY_BYTES),
        api_secret: random_hex(API_SECRET_BYTES),
    }
}

/// Hex SHA-256 of a secret
pub fn hash_secret(secret: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(secret.as_bytes()))
}

fn secret_hash_matches(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::user::tests::test_user;
    use crate::db::repositories::Repositories;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (AppService, i64, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let repos = Repositories::new(pool);
        let ada = repos.users.create(&test_user("Ada", "Lovelace", "ada@example.com")).await.unwrap();
        let bob = repos.users.create(&test_user("Bob", "Builder", "bob@example.com")).await.unwrap();
        (AppService::new(repos.apps.clone()), ada.id, bob.id)
    }

    fn input(name: &str) -> CreateAppInput {
        CreateAppInput {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_credential_shape() {
        let creds = generate_credentials();
        assert_eq!(creds.api_key.len(), 64);
        assert_eq!(creds.api_secret.len(), 128);
        assert!(creds.api_key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash_secret(&creds.api_secret).len(), 64);
        assert_ne!(generate_credentials().api_key, creds.api_key);
    }

    #[test]
    fn test_secret_hash_matches() {
        let stored = hash_secret("s3cret");
        assert!(secret_hash_matches(&hash_secret("s3cret"), &stored));
        assert!(!secret_hash_matches(&hash_secret("s3cret!"), &stored));
        assert!(!secret_hash_matches("abc", &stored));
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let (service, ada, _) = setup().await;
        let (app, creds) = service.create(ada, input("Weather Bot")).await.unwrap();
        assert_eq!(app.permissions, AppPermission::defaults());
        assert_eq!(app.api_secret_hash, hash_secret(&creds.api_secret));

        let authed = service.authenticate(&creds.api_key, &creds.api_secret).await.unwrap();
        assert_eq!(authed.id, app.id);
        assert!(authed.last_used_at.is_some());
        assert!(service.has_permission(&authed, AppPermission::ReadProfile));
        assert!(!service.has_permission(&authed, AppPermission::WriteMessages));

        assert!(matches!(
            service.authenticate(&creds.api_key, "wrong").await,
            Err(AppServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            service.authenticate("nope", &creds.api_secret).await,
            Err(AppServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_validation() {
        let (service, ada, _) = setup().await;
        assert!(matches!(
            service.create(ada, input("x")).await,
            Err(AppServiceError::ValidationError(_))
        ));
        let bad_perm = CreateAppInput {
            name: "Bot".into(),
            permissions: Some(vec!["admin:all".into()]),
            ..Default::default()
        };
        assert!(matches!(
            service.create(ada, bad_perm).await,
            Err(AppServiceError::ValidationError(_))
        ));
        let long = CreateAppInput {
            name: "Bot".into(),
            description: Some("d".repeat(501)),
            ..Default::default()
        };
        assert!(matches!(
            service.create(ada, long).await,
            Err(AppServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_app_limit() {
        let (service, ada, _) = setup().await;
        for i in 0..MAX_APPS_PER_USER {
            service.create(ada, input(&format!("App {}", i))).await.unwrap();
        }
        assert!(matches!(
            service.create(ada, input("One too many")).await,
            Err(AppServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_ownership_and_update() {
        let (service, ada, bob) = setup().await;
        let (app, creds) = service.create(ada, input("Bot")).await.unwrap();

        assert!(matches!(service.get(bob, app.id).await, Err(AppServiceError::NotFound)));
        assert!(matches!(service.delete(bob, app.id).await, Err(AppServiceError::NotFound)));

        let updated = service
            .update(
                ada,
                app.id,
                UpdateAppInput {
                    permissions: Some(vec!["write:messages".into(), "write:messages".into()]),
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.permissions, vec![AppPermission::WriteMessages]);
        assert!(!updated.is_active);
        assert!(matches!(
            service.authenticate(&creds.api_key, &creds.api_secret).await,
            Err(AppServiceError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_regenerate_invalidates_old_pair() {
        let (service, ada, _) = setup().await;
        let (app, old) = service.create(ada, input("Bot")).await.unwrap();
        let new = service.regenerate_credentials(ada, app.id).await.unwrap();

        assert!(service.authenticate(&old.api_key, &old.api_secret).await.is_err());
        assert_eq!(service.authenticate(&new.api_key, &new.api_secret).await.unwrap().id, app.id);

        service.delete(ada, app.id).await.unwrap();
        assert!(service.list(ada).await.unwrap().is_empty());
    }
}
