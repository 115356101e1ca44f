use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use crate::errors::BoardError;

use super::auth::{self, USER_HEADER};
use super::db::{BoardChanges, BoardDb, DbHandle};
use super::models::*;
use super::notify;
use super::ordering::OrderingEngine;
use super::ws::{WsMessage, broadcast_message};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub engine: OrderingEngine,
    pub ws_tx: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(db: DbHandle, ws_tx: broadcast::Sender<String>) -> Self {
        let engine = OrderingEngine::new(Arc::new(db.clone()), Arc::new(db.clone()));
        Self { db, engine, ws_tx }
    }
}

pub type SharedState = Arc<AppState>;

/// Columns every new board starts with.
const DEFAULT_COLUMNS: [(&str, ColumnType); 3] = [
    ("To Do", ColumnType::Todo),
    ("In Progress", ColumnType::InProgress),
    ("Done", ColumnType::Done),
];

const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 200;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateBoardRequest {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
}

#[derive(Deserialize)]
pub struct CreateColumnRequest {
    pub name: String,
    pub column_type: Option<ColumnType>,
}

#[derive(Deserialize)]
pub struct UpdateColumnRequest {
    pub name: Option<String>,
    pub column_type: Option<ColumnType>,
}

#[derive(Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,
    pub color: String,
}

#[derive(Deserialize)]
pub struct CreateCardRequest {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct MoveCardRequest {
    pub column_id: String,
    pub index: i64,
}

#[derive(Deserialize)]
pub struct PostBodyRequest {
    pub body: String,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadRequest(String),
    Internal,
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::NotAuthenticated => ApiError::Unauthorized(err.to_string()),
            BoardError::NotAuthorized => ApiError::Forbidden(err.to_string()),
            BoardError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            BoardError::BadRequest(msg) => ApiError::BadRequest(msg),
            BoardError::Database(e) => {
                tracing::error!("Board operation failed: {:#}", e);
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/boards", get(list_boards).post(create_board))
        .route(
            "/api/boards/{id}",
            get(get_board).patch(update_board).delete(delete_board),
        )
        .route("/api/boards/{id}/members", post(add_member))
        .route("/api/boards/{id}/members/{user_id}", delete(remove_member))
        .route("/api/boards/{id}/columns", post(create_column))
        .route("/api/boards/{id}/labels", post(create_label))
        .route("/api/boards/{id}/activities", get(list_activities))
        .route(
            "/api/boards/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/api/columns/{id}",
            patch(update_column).delete(delete_column),
        )
        .route("/api/columns/{id}/cards", post(append_card))
        .route("/api/columns/{id}/compact", post(compact_column))
        .route(
            "/api/cards/{id}",
            get(get_card).patch(update_card).delete(delete_card),
        )
        .route("/api/cards/{id}/move", patch(move_card))
        .route(
            "/api/cards/{id}/comments",
            get(list_comments).post(add_comment),
        )
        .route("/api/labels/{id}", delete(delete_label))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", post(mark_notification_read))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn require_caller(headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = caller(headers);
    Ok(auth::require_caller(raw.as_deref())?.to_string())
}

fn non_blank(value: &str, what: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApiError::BadRequest(format!("{} must not be empty", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

fn valid_username(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.ends_with('.')
}

fn check_column_type(board: &Board, column_type: Option<&ColumnType>) -> Result<(), ApiError> {
    if let Some(ColumnType::Custom(id)) = column_type {
        if !board.custom_column_types.iter().any(|t| &t.id == id) {
            return Err(ApiError::BadRequest(format!("Unknown column type {}", id)));
        }
    }
    Ok(())
}

/// Drop repeated ids, keeping first occurrences in order.
fn dedup_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn feed_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT)
}

fn log_activity(
    db: &BoardDb,
    board_id: &str,
    user_id: &str,
    card_id: Option<&str>,
    kind: ActivityKind,
    metadata: serde_json::Value,
) {
    let record = NewActivity {
        board_id: board_id.to_string(),
        user_id: user_id.to_string(),
        card_id: card_id.map(str::to_string),
        kind,
        metadata,
    };
    if let Err(e) = db.insert_activity(&record) {
        tracing::warn!(kind = kind.as_str(), error = %e, "Dropped activity record");
    }
}

fn broadcast_notifications(state: &SharedState, notifications: Vec<Notification>) {
    for notification in notifications {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::NotificationCreated { notification },
        );
    }
}

async fn load_board(state: &SharedState, id: &str) -> Result<Board, ApiError> {
    let key = id.to_string();
    state
        .db
        .call(move |db| db.get_board(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| BoardError::not_found("Board", id).into())
}

async fn load_column(state: &SharedState, id: &str) -> Result<Column, ApiError> {
    let key = id.to_string();
    state
        .db
        .call(move |db| db.get_column(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| BoardError::not_found("Column", id).into())
}

async fn load_card(state: &SharedState, id: &str) -> Result<Card, ApiError> {
    let key = id.to_string();
    state
        .db
        .call(move |db| db.get_card(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| BoardError::not_found("Card", id).into())
}

// ── Handlers: health & users ──────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_user(
    State(state): State<SharedState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if !valid_username(&username) {
        return Err(ApiError::BadRequest(format!(
            "Invalid username '{}': use letters, digits, '_', '-' or '.'",
            username
        )));
    }
    let display_name = req
        .display_name
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| username.clone());

    let created = state
        .db
        .call(move |db| {
            if db.find_user_by_username(&username)?.is_some() {
                return Ok(None);
            }
            db.create_user(&username, &display_name, req.email.as_deref())
                .map(Some)
        })
        .await
        .map_err(BoardError::Database)?;

    match created {
        Some(user) => Ok((StatusCode::CREATED, Json(user))),
        None => Err(ApiError::BadRequest("Username is already taken".into())),
    }
}

async fn list_users(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .call(|db| db.list_users())
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(users))
}

async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let key = id.clone();
    let user = state
        .db
        .call(move |db| db.get_user(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| ApiError::from(BoardError::not_found("User", id)))?;
    Ok(Json(user))
}

// ── Handlers: boards ──────────────────────────────────────────────────

async fn list_boards(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let boards = state
        .db
        .call(move |db| db.list_boards_for_user(&user_id))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(boards))
}

async fn create_board(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateBoardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let name = non_blank(&req.name, "Board name")?;

    let view = state
        .db
        .call(move |db| {
            let board = db.create_board(
                &user_id,
                &name,
                req.description.as_deref(),
                req.icon.as_deref(),
                req.is_public,
            )?;
            for (column_name, column_type) in &DEFAULT_COLUMNS {
                db.create_column(&board.id, column_name, Some(column_type))?;
            }
            log_activity(
                db,
                &board.id,
                &user_id,
                None,
                ActivityKind::BoardCreated,
                json!({ "board_name": board.name }),
            );
            db.get_board_view(&board.id)?
                .context("Board not found after create")
        })
        .await
        .map_err(BoardError::Database)?;

    tracing::info!(board_id = %view.board.id, "Created board");
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BoardCreated {
            board: view.board.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_board(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_reader(&board, &user_id)?;

    let view = state
        .db
        .call(move |db| db.get_board_view(&id))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| ApiError::from(BoardError::not_found("Board", board.id)))?;
    Ok(Json(view))
}

async fn update_board(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(changes): Json<BoardChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_owner(&board, &user_id)?;
    if let Some(name) = &changes.name {
        non_blank(name, "Board name")?;
    }

    let updated = state
        .db
        .call(move |db| db.update_board(&id, &changes))
        .await
        .map_err(BoardError::Database)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::BoardUpdated {
            board: updated.clone(),
        },
    );
    Ok(Json(updated))
}

async fn delete_board(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_owner(&board, &user_id)?;

    state
        .db
        .call(move |db| db.delete_board(&id))
        .await
        .map_err(BoardError::Database)?;
    tracing::info!(board_id = %board.id, "Deleted board");
    broadcast_message(&state.ws_tx, &WsMessage::BoardDeleted { board_id: board.id });
    Ok(StatusCode::NO_CONTENT)
}

async fn add_member(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_owner(&board, &caller_id)?;

    let member_id = req.user_id.clone();
    let (updated, added) = state
        .db
        .call(move |db| {
            if db.get_user(&member_id)?.is_none() {
                return Ok((None, false));
            }
            if board.is_member(&member_id) {
                return Ok((Some(board), false));
            }
            let mut members = board.members.clone();
            members.push(member_id.clone());
            let updated = db.set_board_members(&board.id, &members)?;
            log_activity(
                db,
                &board.id,
                &caller_id,
                None,
                ActivityKind::MemberAdded,
                json!({ "member_id": member_id }),
            );
            Ok((Some(updated), true))
        })
        .await
        .map_err(BoardError::Database)?;

    let updated = updated
        .ok_or_else(|| ApiError::from(BoardError::not_found("User", req.user_id.clone())))?;
    if added {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::MemberAdded {
                board_id: updated.id.clone(),
                user_id: req.user_id,
            },
        );
    }
    Ok(Json(updated))
}

async fn remove_member(
    State(state): State<SharedState>,
    Path((id, member_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let caller_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_owner(&board, &caller_id)?;
    if board.is_owner(&member_id) {
        return Err(ApiError::BadRequest("The board owner cannot be removed".into()));
    }

    let removed_id = member_id.clone();
    let (updated, removed) = state
        .db
        .call(move |db| {
            if !board.members.contains(&removed_id) {
                return Ok((board, false));
            }
            let members: Vec<String> = board
                .members
                .iter()
                .filter(|m| **m != removed_id)
                .cloned()
                .collect();
            let updated = db.set_board_members(&board.id, &members)?;
            log_activity(
                db,
                &board.id,
                &caller_id,
                None,
                ActivityKind::MemberRemoved,
                json!({ "member_id": removed_id }),
            );
            Ok((updated, true))
        })
        .await
        .map_err(BoardError::Database)?;

    if removed {
        broadcast_message(
            &state.ws_tx,
            &WsMessage::MemberRemoved {
                board_id: updated.id.clone(),
                user_id: member_id,
            },
        );
    }
    Ok(Json(updated))
}

async fn list_activities(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_reader(&board, &user_id)?;

    let limit = feed_limit(query.limit);
    let activities = state
        .db
        .call(move |db| db.list_activities(&id, limit))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(activities))
}

// ── Handlers: team chat ───────────────────────────────────────────────

async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_reader(&board, &user_id)?;

    let limit = feed_limit(query.limit);
    let messages = state
        .db
        .call(move |db| db.list_messages(&id, limit))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(messages))
}

async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PostBodyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_member(&board, &user_id)?;
    let body = non_blank(&req.body, "Message")?;

    let (message, notifications) = state
        .db
        .call(move |db| notify::post_message(db, &board, &user_id, &body))
        .await
        .map_err(BoardError::Database)?;

    broadcast_message(
        &state.ws_tx,
        &WsMessage::MessagePosted {
            message: message.clone(),
        },
    );
    broadcast_notifications(&state, notifications);
    Ok((StatusCode::CREATED, Json(message)))
}

// ── Handlers: columns & labels ────────────────────────────────────────

async fn create_column(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_member(&board, &user_id)?;
    let name = non_blank(&req.name, "Column name")?;
    check_column_type(&board, req.column_type.as_ref())?;

    let column = state
        .db
        .call(move |db| {
            let column = db.create_column(&board.id, &name, req.column_type.as_ref())?;
            log_activity(
                db,
                &board.id,
                &user_id,
                None,
                ActivityKind::ColumnCreated,
                json!({ "column_name": column.name }),
            );
            Ok(column)
        })
        .await
        .map_err(BoardError::Database)?;

    broadcast_message(
        &state.ws_tx,
        &WsMessage::ColumnCreated {
            column: column.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(column)))
}

async fn update_column(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateColumnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let column = load_column(&state, &id).await?;
    let board = load_board(&state, &column.board_id).await?;
    auth::require_member(&board, &user_id)?;
    let name = req
        .name
        .as_deref()
        .map(|n| non_blank(n, "Column name"))
        .transpose()?;
    check_column_type(&board, req.column_type.as_ref())?;

    let updated = state
        .db
        .call(move |db| db.update_column(&id, name.as_deref(), req.column_type.as_ref()))
        .await
        .map_err(BoardError::Database)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ColumnUpdated {
            column: updated.clone(),
        },
    );
    Ok(Json(updated))
}

async fn delete_column(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let column = load_column(&state, &id).await?;
    let board = load_board(&state, &column.board_id).await?;
    auth::require_member(&board, &user_id)?;

    let column_name = column.name.clone();
    let board_id = board.id.clone();
    state
        .db
        .call(move |db| {
            db.delete_column(&id)?;
            log_activity(
                db,
                &board_id,
                &user_id,
                None,
                ActivityKind::ColumnDeleted,
                json!({ "column_name": column_name }),
            );
            Ok(())
        })
        .await
        .map_err(BoardError::Database)?;

    broadcast_message(
        &state.ws_tx,
        &WsMessage::ColumnDeleted {
            board_id: board.id,
            column_id: column.id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn create_label(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateLabelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let board = load_board(&state, &id).await?;
    auth::require_member(&board, &user_id)?;
    let name = non_blank(&req.name, "Label name")?;

    let label = state
        .db
        .call(move |db| db.create_label(&board.id, &name, &req.color))
        .await
        .map_err(BoardError::Database)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::LabelCreated {
            label: label.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(label)))
}

async fn delete_label(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let key = id.clone();
    let label = state
        .db
        .call(move |db| db.get_label(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| ApiError::from(BoardError::not_found("Label", id.clone())))?;
    let board = load_board(&state, &label.board_id).await?;
    auth::require_member(&board, &user_id)?;

    state
        .db
        .call(move |db| db.delete_label(&id))
        .await
        .map_err(BoardError::Database)?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::LabelDeleted {
            board_id: board.id,
            label_id: label.id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

// ── Handlers: cards (ordering engine) ─────────────────────────────────

async fn append_card(
    State(state): State<SharedState>,
    Path(column_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_caller(&headers)?;
    let title = non_blank(&req.title, "Card title")?;
    let card = state
        .engine
        .append(caller(&headers).as_deref(), &column_id, &title, req.description)
        .await?;
    broadcast_message(&state.ws_tx, &WsMessage::CardCreated { card: card.clone() });
    Ok((StatusCode::CREATED, Json(card)))
}

async fn move_card(
    State(state): State<SharedState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MoveCardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .engine
        .move_card(
            caller(&headers).as_deref(),
            &card_id,
            &req.column_id,
            req.index,
        )
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CardMoved {
            board_id: outcome.card.board_id.clone(),
            card_id: outcome.card.id.clone(),
            from_column: outcome.from_column_id.clone(),
            to_column: outcome.to_column_id.clone(),
            order: outcome.card.order,
        },
    );
    Ok(Json(outcome.card))
}

async fn delete_card(
    State(state): State<SharedState>,
    Path(card_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let card = state
        .engine
        .delete(caller(&headers).as_deref(), &card_id)
        .await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::CardDeleted {
            board_id: card.board_id,
            card_id: card.id,
            column_id: card.column_id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

async fn compact_column(
    State(state): State<SharedState>,
    Path(column_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let rewritten = state
        .engine
        .compact(caller(&headers).as_deref(), &column_id)
        .await?;
    let column = load_column(&state, &column_id).await?;
    broadcast_message(
        &state.ws_tx,
        &WsMessage::ColumnCompacted {
            board_id: column.board_id,
            column_id: column.id,
            rewritten,
        },
    );
    Ok(Json(json!({ "rewritten": rewritten })))
}

// ── Handlers: card details & comments ─────────────────────────────────

async fn get_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let card = load_card(&state, &id).await?;
    let board = load_board(&state, &card.board_id).await?;
    auth::require_reader(&board, &user_id)?;

    let comments = state
        .db
        .call(move |db| db.list_comments(&id))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(CardDetail { card, comments }))
}

async fn update_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(mut changes): Json<CardChanges>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let before = load_card(&state, &id).await?;
    let board = load_board(&state, &before.board_id).await?;
    auth::require_member(&board, &user_id)?;
    if let Some(title) = &changes.title {
        non_blank(title, "Card title")?;
    }

    if let Some(assignees) = changes.assignees.take() {
        let assignees = dedup_ids(assignees);
        if let Some(outsider) = assignees.iter().find(|a| !board.is_member(a)) {
            return Err(ApiError::BadRequest(format!(
                "User {} is not a member of this board",
                outsider
            )));
        }
        changes.assignees = Some(assignees);
    }
    if let Some(labels) = changes.labels.take() {
        let labels = dedup_ids(labels);
        let board_id = board.id.clone();
        let known = state
            .db
            .call(move |db| db.list_labels(&board_id))
            .await
            .map_err(BoardError::Database)?;
        if let Some(unknown) = labels.iter().find(|l| !known.iter().any(|k| &k.id == *l)) {
            return Err(ApiError::BadRequest(format!("Unknown label {}", unknown)));
        }
        changes.labels = Some(labels);
    }

    let fields: Vec<&'static str> = [
        ("title", changes.title.is_some()),
        ("description", changes.description.is_some()),
        ("due_date", changes.due_date.is_some()),
        ("color", changes.color.is_some()),
        ("story_points", changes.story_points.is_some()),
        ("time_estimate", changes.time_estimate.is_some()),
        ("time_spent", changes.time_spent.is_some()),
        ("assignees", changes.assignees.is_some()),
        ("labels", changes.labels.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect();

    let (card, notifications) = state
        .db
        .call(move |db| {
            let card = db.update_card(&id, &changes)?;
            let notifications = notify::notify_new_assignees(db, &before, &card, &user_id)?;
            log_activity(
                db,
                &card.board_id,
                &user_id,
                Some(&card.id),
                ActivityKind::CardUpdated,
                json!({ "card_title": card.title, "fields": fields }),
            );
            Ok((card, notifications))
        })
        .await
        .map_err(BoardError::Database)?;

    broadcast_message(&state.ws_tx, &WsMessage::CardUpdated { card: card.clone() });
    broadcast_notifications(&state, notifications);
    Ok(Json(card))
}

async fn list_comments(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let card = load_card(&state, &id).await?;
    let board = load_board(&state, &card.board_id).await?;
    auth::require_reader(&board, &user_id)?;

    let comments = state
        .db
        .call(move |db| db.list_comments(&id))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(comments))
}

async fn add_comment(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PostBodyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let card = load_card(&state, &id).await?;
    let board = load_board(&state, &card.board_id).await?;
    auth::require_member(&board, &user_id)?;
    let body = non_blank(&req.body, "Comment")?;

    let (comment, notifications) = state
        .db
        .call(move |db| notify::add_comment(db, &board, &card, &user_id, &body))
        .await
        .map_err(BoardError::Database)?;

    broadcast_message(
        &state.ws_tx,
        &WsMessage::CommentAdded {
            comment: comment.clone(),
        },
    );
    broadcast_notifications(&state, notifications);
    Ok((StatusCode::CREATED, Json(comment)))
}

// ── Handlers: notifications ───────────────────────────────────────────

async fn list_notifications(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<NotificationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let notifications = state
        .db
        .call(move |db| db.list_notifications(&user_id, query.unread))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(notifications))
}

async fn mark_notification_read(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = require_caller(&headers)?;
    let key = id.clone();
    let notification = state
        .db
        .call(move |db| db.get_notification(&key))
        .await
        .map_err(BoardError::Database)?
        .ok_or_else(|| ApiError::from(BoardError::not_found("Notification", id.clone())))?;
    if notification.user_id != user_id {
        return Err(ApiError::Forbidden(
            "Not authorized to modify this notification".into(),
        ));
    }

    let updated = state
        .db
        .call(move |db| db.mark_notification_read(&id))
        .await
        .map_err(BoardError::Database)?;
    Ok(Json(updated))
}

// ── Tests ─────────────────────────────────────────────────────────────
