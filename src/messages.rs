use axum::extract::Query;
use axum::{Json, extract::State, http::StatusCode};
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::{get_current_user, get_user_by_id_public};
use crate::constants::*;
use crate::models::{ConversationQuery, ConversationResponse, Message, SendMessagePayload};
use crate::utils::{
    db_error, db_error_with_context, now_rfc3339, validate_messages_limit, validate_offset,
    validate_string_length,
};
use crate::{AppState, Db};

async fn are_friends(db: &Db, user_id: &str, other_id: &str) -> Result<bool, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT 1 FROM friendships WHERE user_id = ? AND friend_user_id = ?",
            (user_id, other_id),
        )
        .await
        .map_err(|_| db_error_with_context("failed to check friendship"))?;

    Ok(rows.next().await.map_err(|_| db_error())?.is_some())
}

pub async fn send_message(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;

    validate_string_length(&payload.body, "Message body", MAX_MESSAGE_LENGTH)?;

    if payload.to_id == current_user.id {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot message yourself".to_string(),
        ));
    }

    let recipient = get_user_by_id_public(&app_state.main_db, &payload.to_id)
        .await
        .map_err(|_| db_error_with_context("failed to look up user"))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "User not found".to_string()))?;

    if !are_friends(&app_state.main_db, &current_user.id, &recipient.id).await? {
        return Err((
            StatusCode::FORBIDDEN,
            "Can only message accepted friends".to_string(),
        ));
    }

    let message_id = Uuid::new_v4().to_string();
    let now = now_rfc3339()?;
    let body = payload.body.trim().to_string();

    let conn = app_state.main_db.write().await;
    conn.execute(
        "INSERT INTO messages (id, from_user_id, to_user_id, body, sent_at) VALUES (?, ?, ?, ?, ?)",
        (
            message_id.as_str(),
            current_user.id.as_str(),
            recipient.id.as_str(),
            body.as_str(),
            now.as_str(),
        ),
    )
    .await
    .map_err(|_| db_error_with_context("message creation failed"))?;

    Ok((
        StatusCode::CREATED,
        Json(Message {
            id: message_id,
            from_user_id: current_user.id,
            to_user_id: recipient.id,
            body,
            sent_at: now,
        }),
    ))
}

pub async fn get_conversation(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ConversationQuery>,
) -> Result<(StatusCode, Json<ConversationResponse>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;
    let user_id = &current_user.id;

    let limit = validate_messages_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    if !are_friends(&app_state.main_db, user_id, &query.friend_id).await? {
        return Err((
            StatusCode::FORBIDDEN,
            "Can only view conversations with accepted friends".to_string(),
        ));
    }

    let conn = app_state.main_db.read().await;

    let total_count: i64 = {
        let mut count_rows = conn
            .query(
                "SELECT COUNT(*) FROM messages WHERE (from_user_id = ? AND to_user_id = ?) OR (from_user_id = ? AND to_user_id = ?)",
                (
                    user_id.as_str(),
                    query.friend_id.as_str(),
                    query.friend_id.as_str(),
                    user_id.as_str(),
                ),
            )
            .await
            .map_err(|_| db_error_with_context("failed to count messages"))?;

        match count_rows.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => 0,
        }
    };

    let mut rows = conn
        .query(
            "SELECT id, from_user_id, to_user_id, body, sent_at FROM messages WHERE (from_user_id = ? AND to_user_id = ?) OR (from_user_id = ? AND to_user_id = ?) ORDER BY sent_at DESC LIMIT ? OFFSET ?",
            (
                user_id.as_str(),
                query.friend_id.as_str(),
                query.friend_id.as_str(),
                user_id.as_str(),
                limit,
                offset,
            ),
        )
        .await
        .map_err(|_| db_error_with_context("failed to list messages"))?;

    let mut messages = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let id: String = row
            .get(0)
            .map_err(|_| db_error_with_context("invalid message data"))?;
        let from_user_id: String = row
            .get(1)
            .map_err(|_| db_error_with_context("invalid message data"))?;
        let to_user_id: String = row
            .get(2)
            .map_err(|_| db_error_with_context("invalid message data"))?;
        let body: String = row
            .get(3)
            .map_err(|_| db_error_with_context("invalid message data"))?;
        let sent_at: String = row
            .get(4)
            .map_err(|_| db_error_with_context("invalid message data"))?;

        messages.push(Message {
            id,
            from_user_id,
            to_user_id,
            body,
            sent_at,
        });
    }

    Ok((
        StatusCode::OK,
        Json(ConversationResponse {
            messages,
            total_count: total_count as u32,
            limit,
            offset,
        }),
    ))
}
