//! Theme engine
//!
//! Server-rendered pages use Tera. The built-in default templates are compiled
//! into the binary; files in `{themes}/{active}` override them by name, so a
//! theme only needs to ship the templates it changes.

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fs;
use std::path::{Path, PathBuf};
use tera::{Context as TeraContext, Tera};

use crate::models::User;

mod error;

pub use error::ThemeError;

/// Templates compiled into the binary
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../themes/default/base.html")),
    ("partials/message.html", include_str!("../../themes/default/partials/message.html")),
    ("index.html", include_str!("../../themes/default/index.html")),
    ("messages.html", include_str!("../../themes/default/messages.html")),
    ("login.html", include_str!("../../themes/default/login.html")),
    ("register.html", include_str!("../../themes/default/register.html")),
    ("profile.html", include_str!("../../themes/default/profile.html")),
    ("friends.html", include_str!("../../themes/default/friends.html")),
    ("notifications.html", include_str!("../../themes/default/notifications.html")),
    ("admin.html", include_str!("../../themes/default/admin.html")),
    ("error.html", include_str!("../../themes/default/error.html")),
];

/// Theme engine for rendering templates
pub struct ThemeEngine {
    tera: Tera,
    themes_path: PathBuf,
    current_theme: String,
}

impl ThemeEngine {
    /// Build the engine for `theme`. A missing theme directory is not an
    /// error; the built-in templates are used as they are.
    pub fn new(themes_path: &Path, theme: &str) -> Result<Self> {
        let themes_path = themes_path.to_path_buf();
        let tera = Self::load_templates(&themes_path.join(theme))?;
        Ok(Self {
            tera,
            themes_path,
            current_theme: theme.to_string(),
        })
    }

    fn load_templates(theme_path: &Path) -> Result<Tera> {
        let mut templates: BTreeMap<String, String> = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_string()))
            .collect();

        if theme_path.is_dir() {
            let mut overrides = Vec::new();
            collect_templates_from_dir(theme_path, theme_path, &mut overrides)?;
            tracing::info!(
                "Loaded {} template(s) from {}",
                overrides.len(),
                theme_path.display()
            );
            templates.extend(overrides);
        } else {
            tracing::debug!("Theme directory {} not found, using built-in templates", theme_path.display());
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(format!("Failed to load templates: {}", error_chain(&e))))?;
        Ok(tera)
    }

    /// Re-read the active theme from disk. On failure the loaded templates stay in use.
    pub fn reload_templates(&mut self) -> Result<()> {
        self.tera = Self::load_templates(&self.themes_path.join(&self.current_theme))?;
        tracing::info!("Reloaded theme {}", self.current_theme);
        Ok(())
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera.render(template, context).map_err(|e| {
            ThemeError::TemplateError(format!("Failed to render '{}': {}", template, error_chain(&e))).into()
        })
    }

    /// Render a template with standard variables automatically added
    pub fn render_with_standard_vars(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("site_name", &standard_vars.site_name);
        full_context.insert("request_path", &standard_vars.request_path);
        full_context.insert("theme_name", &self.current_theme);
        full_context.insert("year", &standard_vars.year);
        full_context.insert("unread_notifications", &standard_vars.unread_notifications);
        if let Some(ref user) = standard_vars.current_user {
            full_context.insert("current_user", user);
        }

        self.render(template, &full_context)
    }

    /// Render a template, falling back to `error.html` and then to a plain page
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render template '{}': {}, trying error template", template, e);

                let mut error_context = context.clone();
                error_context.insert("status", &500);
                error_context.insert("error_message", "The page could not be rendered");

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!(
                            "Failed to render error template: {}, returning simple HTML error page",
                            error_template_err
                        );
                        Self::simple_error_page(template, &e.to_string())
                    }
                }
            }
        }
    }

    /// Last-resort page when even `error.html` fails
    fn simple_error_page(template: &str, error: &str) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Template Error</title>
</head>
<body>
    <h1>Template Error</h1>
    <p>Failed to render template: <code>{}</code></p>
    <p><strong>Error:</strong> {}</p>
</body>
</html>"#,
            tera::escape_html(template),
            tera::escape_html(error)
        )
    }

    pub fn current_theme(&self) -> &str {
        &self.current_theme
    }
}

/// Collect `.html` files below `current_path`, named relative to `base_path`
fn collect_templates_from_dir(base_path: &Path, current_path: &Path, templates: &mut Vec<(String, String)>) -> Result<()> {
    for entry in fs::read_dir(current_path)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().map_or(false, |ext| ext == "html") {
            let relative_path = path
                .strip_prefix(base_path)
                .map_err(|_| ThemeError::TemplateError("Failed to get relative path".to_string()))?;
            let template_name = relative_path.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;
            templates.push((template_name, content));
        }
    }
    Ok(())
}

fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        message.push_str(&format!("\n  Caused by: {}", s));
        source = s.source();
    }
    message
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub current_user: Option<CurrentUser>,
    pub unread_notifications: i64,
    pub request_path: String,
    /// Current year (for copyright)
    pub year: i32,
}

/// Signed-in member as templates see it
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub is_admin: bool,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            avatar: user.avatar_url(),
            is_admin: user.is_admin(),
        }
    }
}

impl StandardTemplateVars {
    pub fn new(site_name: impl Into<String>, request_path: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            current_user: None,
            unread_notifications: 0,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: CurrentUser, unread_notifications: i64) -> Self {
        self.current_user = Some(user);
        self.unread_notifications = unread_notifications;
        self
    }
}

#[cfg(test)]
mod tests;
