//! Server-rendered HTML pages
//!
//! Pages share the session cookie with the JSON API. Every page gets the
//! standard template variables; failures render `error.html` with the same
//! status an API client would see.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use std::sync::{PoisonError, RwLockReadGuard};
use tera::Context as TeraContext;

use crate::api::auth::{register_and_sign_in, sign_in};
use crate::api::common::{clear_session_cookie_headers, session_cookie_headers, PaginationQuery};
use crate::api::middleware::{extract_session_token, ApiError, AppState, MaybeUser};
use crate::models::{FriendshipStatus, PageRequest, User};
use crate::services::{LoginInput, RegisterInput};
use crate::theme::{CurrentUser, StandardTemplateVars, ThemeEngine};

pub const SITE_NAME: &str = "Socialnet";

/// Messages shown on the home page and on profiles
const PAGE_MESSAGES: i64 = 20;
const HOME_TRENDING: usize = 10;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", post(logout))
        .route("/messages", get(messages_page))
        .route("/profile", get(own_profile_page))
        .route("/profile/{id}", get(profile_page))
        .route("/friends", get(friends_page))
        .route("/notifications", get(notifications_page))
        .route("/admin", get(admin_page))
}

/// A poisoned lock still holds a complete engine
fn theme(state: &AppState) -> RwLockReadGuard<'_, ThemeEngine> {
    state.theme_engine.read().unwrap_or_else(PoisonError::into_inner)
}

async fn standard_vars(state: &AppState, user: Option<&User>, path: &str) -> StandardTemplateVars {
    let vars = StandardTemplateVars::new(SITE_NAME, path);
    match user {
        Some(user) => {
            let unread = match state.notification_service.unread_count(user.id).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!("Failed to count notifications for user {}: {}", user.id, e);
                    0
                }
            };
            vars.with_user(CurrentUser::from(user), unread)
        }
        None => vars,
    }
}

/// Render `template`, or the error page when building the context failed
async fn render_page(
    state: &AppState,
    user: Option<&User>,
    path: &str,
    template: &str,
    context: Result<TeraContext, ApiError>,
) -> Response {
    let context = match context {
        Ok(context) => context,
        Err(e) => return error_page(state, user, path, e.status(), &e.error.message).await,
    };

    let vars = standard_vars(state, user, path).await;
    let rendered = theme(state).render_with_standard_vars(template, &context, &vars);
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render {}: {:#}", template, e);
            error_page(
                state,
                user,
                path,
                StatusCode::INTERNAL_SERVER_ERROR,
                "The page could not be rendered",
            )
            .await
        }
    }
}

async fn error_page(
    state: &AppState,
    user: Option<&User>,
    path: &str,
    status: StatusCode,
    message: &str,
) -> Response {
    let vars = standard_vars(state, user, path).await;
    let mut context = TeraContext::new();
    context.insert("status", &status.as_u16());
    context.insert("error_message", message);

    let html = {
        let engine = theme(state);
        match engine.render_with_standard_vars("error.html", &context, &vars) {
            Ok(html) => html,
            Err(_) => engine.render_with_fallback("error.html", &context),
        }
    };
    (status, Html(html)).into_response()
}

/// A form page re-rendered with an error message
async fn form_error(
    state: &AppState,
    path: &str,
    template: &str,
    error: ApiError,
    fields: &[(&str, &str)],
) -> Response {
    let status = error.status();
    let mut context = TeraContext::new();
    context.insert("error", &error.error.message);
    for (name, value) in fields {
        context.insert(*name, value);
    }
    let page = render_page(state, None, path, template, Ok(context)).await;
    (status, page).into_response()
}

fn signed_in_redirect(token: &str, days: i64) -> Response {
    match session_cookie_headers(token, days) {
        Ok(cookie) => (cookie, Redirect::to("/")).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /
async fn home(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    let context = async {
        let request = PageRequest::new(1, PAGE_MESSAGES, PAGE_MESSAGES);
        let feed = state.feed_service.public_feed(request).await?;
        let trending = state.feed_service.trending_hashtags(HOME_TRENDING).await?;
        let mut context = TeraContext::new();
        context.insert("messages", &feed.items);
        context.insert("trending", &trending);
        Ok::<_, ApiError>(context)
    }
    .await;
    render_page(&state, viewer.0.as_ref(), "/", "index.html", context).await
}

/// GET /login
async fn login_page(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    if viewer.0.is_some() {
        return Redirect::to("/").into_response();
    }
    render_page(&state, None, "/login", "login.html", Ok(TeraContext::new())).await
}

/// POST /login
async fn login_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let input = LoginInput::new(form.email.clone(), form.password);
    match sign_in(&state, &headers, input).await {
        Ok((session, _)) => signed_in_redirect(&session.id, state.session_expiration_days),
        Err(e) => form_error(&state, "/login", "login.html", e, &[("email", form.email.as_str())]).await,
    }
}

/// GET /register
async fn register_page(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    if viewer.0.is_some() {
        return Redirect::to("/").into_response();
    }
    render_page(&state, None, "/register", "register.html", Ok(TeraContext::new())).await
}

/// POST /register
async fn register_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<RegisterInput>,
) -> Response {
    let fields = [
        ("first_name", form.first_name.clone()),
        ("last_name", form.last_name.clone()),
        ("email", form.email.clone()),
    ];
    match register_and_sign_in(&state, &headers, form).await {
        Ok((session, _)) => signed_in_redirect(&session.id, state.session_expiration_days),
        Err(e) => {
            let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
            form_error(&state, "/register", "register.html", e, &fields).await
        }
    }
}

/// POST /logout
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::warn!("Failed to end session: {}", e);
        }
    }
    (clear_session_cookie_headers(), Redirect::to("/")).into_response()
}

/// GET /messages
async fn messages_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<PaginationQuery>,
) -> Response {
    let context = async {
        let request = state.feed_service.page_request(query.page, query.limit);
        let page = state.message_service.list(request).await?;
        let mut context = TeraContext::new();
        context.insert("page", &page);
        Ok::<_, ApiError>(context)
    }
    .await;
    render_page(&state, viewer.0.as_ref(), "/messages", "messages.html", context).await
}

async fn profile_context(state: &AppState, viewer: Option<&User>, user_id: i64) -> Result<TeraContext, ApiError> {
    let viewer_id = viewer.map(|u| u.id);
    let profile = state.user_service.public_profile(viewer_id, user_id).await?;
    let is_friend = profile.friendship_status == Some(FriendshipStatus::Accepted);
    let messages = state
        .message_service
        .by_author(user_id, viewer_id, is_friend, PAGE_MESSAGES)
        .await?;

    let mut context = TeraContext::new();
    context.insert("profile", &profile);
    context.insert("is_self", &(viewer_id == Some(user_id)));
    context.insert("messages", &messages);
    Ok(context)
}

/// GET /profile
async fn own_profile_page(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    let Some(user) = viewer.0 else {
        return Redirect::to("/login").into_response();
    };
    let context = profile_context(&state, Some(&user), user.id).await;
    render_page(&state, Some(&user), "/profile", "profile.html", context).await
}

/// GET /profile/{id}
async fn profile_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Response {
    let path = format!("/profile/{}", id);
    let context = profile_context(&state, viewer.0.as_ref(), id).await;
    render_page(&state, viewer.0.as_ref(), &path, "profile.html", context).await
}

/// GET /friends
async fn friends_page(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    let Some(user) = viewer.0 else {
        return Redirect::to("/login").into_response();
    };
    let context = async {
        let friends = state.friendship_service.list(user.id).await?;
        let mut context = TeraContext::new();
        context.insert("friends", &friends);
        Ok::<_, ApiError>(context)
    }
    .await;
    render_page(&state, Some(&user), "/friends", "friends.html", context).await
}

/// GET /notifications
async fn notifications_page(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<PaginationQuery>,
) -> Response {
    let Some(user) = viewer.0 else {
        return Redirect::to("/login").into_response();
    };
    let context = async {
        let request = state.feed_service.page_request(query.page, query.limit);
        let page = state.notification_service.list(user.id, None, request).await?;
        let mut context = TeraContext::new();
        context.insert("notifications", &page);
        Ok::<_, ApiError>(context)
    }
    .await;
    render_page(&state, Some(&user), "/notifications", "notifications.html", context).await
}

/// GET /admin
async fn admin_page(State(state): State<AppState>, viewer: MaybeUser) -> Response {
    let Some(user) = viewer.0 else {
        return Redirect::to("/login").into_response();
    };
    if !user.is_admin() {
        return error_page(
            &state,
            Some(&user),
            "/admin",
            StatusCode::FORBIDDEN,
            "Admin privileges required",
        )
        .await;
    }
    let context = async {
        let stats = state.admin_service.dashboard().await?;
        let mut context = TeraContext::new();
        context.insert("stats", &stats);
        Ok::<_, ApiError>(context)
    }
    .await;
    render_page(&state, Some(&user), "/admin", "admin.html", context).await
}
