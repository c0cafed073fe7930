//! Tests for the theme engine

use super::*;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use tera::Context as TeraContext;

fn has_template(engine: &ThemeEngine, name: &str) -> bool {
    engine.tera.get_template_names().any(|t| t == name)
}

fn builtin_engine() -> ThemeEngine {
    ThemeEngine::new(Path::new("/nonexistent/themes"), "default").unwrap()
}

fn standard_vars() -> StandardTemplateVars {
    StandardTemplateVars::new("Socialnet", "/")
}

fn ada() -> CurrentUser {
    CurrentUser {
        id: 1,
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        avatar: "/uploads/avatars/1.png".to_string(),
        is_admin: true,
    }
}

#[test]
fn test_builtin_templates_are_loaded() {
    let engine = builtin_engine();
    for (name, _) in BUILTIN_TEMPLATES {
        assert!(has_template(&engine, name), "missing {}", name);
    }
    assert_eq!(engine.current_theme(), "default");
}

#[test]
fn test_login_page_renders_error_escaped() {
    let engine = builtin_engine();
    let mut context = TeraContext::new();
    context.insert("error", "<b>Invalid</b> credentials");
    context.insert("email", "ada@example.com");

    let html = engine
        .render_with_standard_vars("login.html", &context, &standard_vars())
        .unwrap();
    assert!(html.contains("Socialnet"));
    assert!(html.contains("&lt;b&gt;Invalid&lt;&#x2F;b&gt; credentials"));
    assert!(html.contains("ada@example.com"));
}

#[test]
fn test_navigation_reflects_current_user() {
    let engine = builtin_engine();
    let context = TeraContext::new();

    let anonymous = engine
        .render_with_standard_vars("error.html", &context, &standard_vars())
        .unwrap();
    assert!(anonymous.contains("/login"));
    assert!(!anonymous.contains("/logout"));

    let vars = standard_vars().with_user(ada(), 3);
    let signed_in = engine.render_with_standard_vars("error.html", &context, &vars).unwrap();
    assert!(signed_in.contains("/logout"));
    assert!(signed_in.contains("/admin"));
    assert!(signed_in.contains("Ada"));
}

#[test]
fn test_error_page_shows_status() {
    let engine = builtin_engine();
    let mut context = TeraContext::new();
    context.insert("status", &404);
    context.insert("error_message", "User not found");
    let html = engine
        .render_with_standard_vars("error.html", &context, &standard_vars())
        .unwrap();
    assert!(html.contains("404"));
    assert!(html.contains("User not found"));
}

#[test]
fn test_messages_page_renders_list() {
    let engine = builtin_engine();
    let mut context = TeraContext::new();
    context.insert(
        "page",
        &json!({
            "items": [{
                "id": 7,
                "content": "Hello #rust",
                "author": {"id": 1, "first_name": "Ada", "last_name": "Lovelace", "avatar": "/a.png"},
                "addressee": null,
                "parent_id": null,
                "visibility": "public",
                "is_private": false,
                "mentions": [],
                "hashtags": ["rust"],
                "likes": 2,
                "dislikes": 0,
                "created_at": "2026-01-02T03:04:05Z"
            }],
            "total": 1,
            "page": 1,
            "limit": 20,
            "pages": 1
        }),
    );
    let html = engine.render_with_fallback("messages.html", &{
        let mut c = context.clone();
        c.insert("site_name", "Socialnet");
        c.insert("year", &2026);
        c.insert("unread_notifications", &0);
        c
    });
    assert!(html.contains("Hello #rust"));
    assert!(!html.contains("Template Error"));
}

#[test]
fn test_missing_template_falls_back_to_error_page() {
    let engine = builtin_engine();
    let mut context = TeraContext::new();
    context.insert("site_name", "Socialnet");
    context.insert("year", &2026);
    context.insert("unread_notifications", &0);

    let html = engine.render_with_fallback("nonexistent.html", &context);
    assert!(html.contains("500"));
    assert!(html.contains("The page could not be rendered"));
}

#[test]
fn test_simple_error_page_escapes() {
    let html = ThemeEngine::simple_error_page("<x>.html", "bad & worse");
    assert!(html.contains("&lt;x&gt;.html"));
    assert!(html.contains("bad &amp; worse"));
}

#[test]
fn test_theme_directory_overrides_builtin() {
    let temp_dir = TempDir::new().unwrap();
    let theme_path = temp_dir.path().join("custom");
    fs::create_dir_all(theme_path.join("partials")).unwrap();
    fs::write(
        theme_path.join("error.html"),
        "<p>custom {{ status }} {{ error_message }}</p>",
    )
    .unwrap();
    fs::write(theme_path.join("partials/extra.html"), "<i>extra</i>").unwrap();
    fs::write(theme_path.join("notes.txt"), "ignored").unwrap();

    let mut engine = ThemeEngine::new(temp_dir.path(), "custom").unwrap();
    assert!(has_template(&engine, "partials/extra.html"));
    assert!(!has_template(&engine, "notes.txt"));
    assert!(has_template(&engine, "login.html"));

    let mut context = TeraContext::new();
    context.insert("status", &403);
    context.insert("error_message", "nope");
    assert_eq!(engine.render("error.html", &context).unwrap(), "<p>custom 403 nope</p>");

    fs::write(theme_path.join("error.html"), "<p>changed</p>").unwrap();
    engine.reload_templates().unwrap();
    assert_eq!(engine.render("error.html", &context).unwrap(), "<p>changed</p>");
}

#[test]
fn test_broken_override_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let theme_path = temp_dir.path().join("broken");
    fs::create_dir_all(&theme_path).unwrap();
    fs::write(theme_path.join("index.html"), "{% if %}").unwrap();

    let err = ThemeEngine::new(temp_dir.path(), "broken").err().unwrap();
    assert!(err.to_string().contains("Failed to load templates"));
}
