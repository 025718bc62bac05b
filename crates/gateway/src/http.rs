//! JSON API for login, user management and message administration.
//!
//! Bodies keep the `{"success": ...}` envelope the chat frontends expect.
//! List endpoints report `success: false` alongside an empty list. Extractor
//! rejections are folded into [`ApiError`] so they use the same envelope.

use {
    axum::{
        Json, Router,
        extract::{
            Path, State,
            rejection::{JsonRejection, PathRejection},
        },
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::info,
};

use {
    hotline_protocol::{MessageId, Role, UserId},
    hotline_store::{MessageStore, NewUser},
};

use crate::{
    error::{ApiError, ApiResult},
    server::AppState,
};

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(login_handler))
        .route("/api/users", get(list_users_handler).post(create_user_handler))
        .route(
            "/api/users/{id}",
            get(get_user_handler).delete(delete_user_handler),
        )
        // GET takes a user id, DELETE a message id.
        .route(
            "/api/messages/{id}",
            get(list_messages_handler).delete(delete_message_handler),
        )
}

// ── Login ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    name: String,
    #[serde(default, alias = "unternehmen")]
    company: String,
}

async fn login_handler(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    if req.name.trim().is_empty() || req.company.trim().is_empty() {
        return Err(ApiError::BadRequest("name and company are required".into()));
    }

    if state.admin.matches(&req.name, &req.company) {
        info!("admin logged in");
        return Ok(Json(json!({
            "success": true,
            "userId": Role::Admin.wire_id(),
            "coverLetter": "Admin signed in",
        })));
    }

    let user = state
        .store
        .find_login(&req.name, &req.company)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(json!({
        "success": true,
        "userId": user.id,
        "coverLetter": user.cover_letter,
    })))
}

// ── Users ────────────────────────────────────────────────────────────────────

async fn list_users_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let users = state.store.list_users().await?;
    Ok(Json(json!({ "success": !users.is_empty(), "users": users })))
}

async fn create_user_handler(
    State(state): State<AppState>,
    new_user: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_user) = new_user?;
    let user = state.store.create_user(new_user).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "user": user })),
    ))
}

async fn get_user_handler(
    State(state): State<AppState>,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no user with id {id}")))?;
    Ok(Json(json!({ "success": true, "data": user })))
}

async fn delete_user_handler(
    State(state): State<AppState>,
    id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    if !state.store.delete_user(id).await? {
        return Err(ApiError::NotFound(format!("no user with id {id}")));
    }
    Ok(Json(json!({ "success": true })))
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// Messages of one conversation, or every message for user id `0`.
async fn list_messages_handler(
    State(state): State<AppState>,
    user_id: Result<Path<UserId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(user_id) = user_id?;
    let role = Role::from_wire(user_id).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let messages = state.store.list_for(role).await?;
    Ok(Json(json!({ "success": !messages.is_empty(), "messages": messages })))
}

async fn delete_message_handler(
    State(state): State<AppState>,
    id: Result<Path<MessageId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let deleted = state.store.delete_by_id(id).await?;
    if deleted {
        info!(id, "message deleted");
    }
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}
