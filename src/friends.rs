use axum::extract::Query;
use axum::{Json, extract::State, http::StatusCode};
use libsql::Connection;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::{get_current_user, get_user_by_username_public};
use crate::constants::*;
use crate::entitlements::is_premium;
use crate::limits::daily_friend_request_quota;
use crate::models::{
    AcceptRequestPayload, Friend, FriendRequest, GetRequestsQuery, ListFriendsQuery, QuotaStatus,
    RejectRequestPayload, SendFriendRequestPayload,
};
use crate::utils::{
    db_error, db_error_with_context, now_rfc3339, today_start_rfc3339, validate_friends_limit,
    validate_offset, validate_request_transition,
};
use crate::{AppState, TransactionError, with_transaction};

/// Number of requests the user has sent since the start of the current UTC
/// day, excluding rejected ones (a rejection frees the quota slot).
pub async fn count_requests_today(
    conn: &Connection,
    user_id: &str,
    day_start: &str,
) -> Result<u32, libsql::Error> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM friend_requests WHERE from_user_id = ? AND status != ? AND requested_at >= ?",
            (user_id, REQUEST_STATUS_REJECTED, day_start),
        )
        .await?;

    match rows.next().await? {
        Some(row) => {
            let count: i64 = row.get(0)?;
            Ok(count as u32)
        }
        None => Ok(0),
    }
}

fn extract_request_from_row(row: &libsql::Row) -> Result<FriendRequest, libsql::Error> {
    Ok(FriendRequest {
        id: row.get(0)?,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        status: row.get(3)?,
        requested_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

enum SendRequestError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    QuotaReached,
    AlreadyFriends,
    AlreadyPending,
}

impl From<TransactionError> for SendRequestError {
    fn from(e: TransactionError) -> Self {
        SendRequestError::Transaction(e)
    }
}

impl From<SendRequestError> for (StatusCode, String) {
    fn from(e: SendRequestError) -> Self {
        match e {
            SendRequestError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            SendRequestError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            SendRequestError::DbCheck => db_error_with_context("failed to check friend request"),
            SendRequestError::DbInsert => db_error_with_context("friend request creation failed"),
            SendRequestError::QuotaReached => (
                StatusCode::TOO_MANY_REQUESTS,
                "Daily friend request limit reached".to_string(),
            ),
            SendRequestError::AlreadyFriends => (
                StatusCode::CONFLICT,
                "Already friends with this user".to_string(),
            ),
            SendRequestError::AlreadyPending => (
                StatusCode::CONFLICT,
                "A pending friend request already exists".to_string(),
            ),
        }
    }
}

pub async fn send_friend_request(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<SendFriendRequestPayload>,
) -> Result<(StatusCode, Json<FriendRequest>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;

    if payload.to_username.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Friend username cannot be empty".to_string(),
        ));
    }

    if payload.to_username.len() > MAX_USERNAME_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Username cannot exceed {} characters", MAX_USERNAME_LENGTH),
        ));
    }

    if payload.to_username == current_user.username {
        return Err((
            StatusCode::BAD_REQUEST,
            "Cannot send friend request to yourself".to_string(),
        ));
    }

    let friend_user = get_user_by_username_public(&app_state.main_db, &payload.to_username)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "User not found".to_string()))?;

    // Resolve the tier before taking the write lock; the premium lookup
    // holds its own read lock.
    let premium = is_premium(&app_state.main_db, &current_user.id).await?;
    let quota = daily_friend_request_quota(premium);

    let day_start = today_start_rfc3339()?;
    let now = now_rfc3339()?;
    let request_id = Uuid::new_v4().to_string();

    // Quota check and insert run in one transaction so the invariant (today's
    // non-rejected count never exceeds the quota) holds at the moment of
    // acceptance, not just at check time.
    let request = with_transaction(&app_state.main_db, |conn| {
        let request_id = request_id.clone();
        let from_id = current_user.id.clone();
        let to_id = friend_user.id.clone();
        let day_start = day_start.clone();
        let now = now.clone();
        Box::pin(async move {
            let sent_today = count_requests_today(conn, &from_id, &day_start)
                .await
                .map_err(|_| SendRequestError::DbCheck)?;

            if sent_today >= quota {
                return Err(SendRequestError::QuotaReached);
            }

            let mut friend_rows = conn
                .query(
                    "SELECT 1 FROM friendships WHERE user_id = ? AND friend_user_id = ?",
                    (from_id.as_str(), to_id.as_str()),
                )
                .await
                .map_err(|_| SendRequestError::DbCheck)?;

            if friend_rows
                .next()
                .await
                .map_err(|_| SendRequestError::DbCheck)?
                .is_some()
            {
                return Err(SendRequestError::AlreadyFriends);
            }

            let mut pending_rows = conn
                .query(
                    "SELECT 1 FROM friend_requests WHERE status = ? AND ((from_user_id = ? AND to_user_id = ?) OR (from_user_id = ? AND to_user_id = ?))",
                    (
                        REQUEST_STATUS_PENDING,
                        from_id.as_str(),
                        to_id.as_str(),
                        to_id.as_str(),
                        from_id.as_str(),
                    ),
                )
                .await
                .map_err(|_| SendRequestError::DbCheck)?;

            if pending_rows
                .next()
                .await
                .map_err(|_| SendRequestError::DbCheck)?
                .is_some()
            {
                return Err(SendRequestError::AlreadyPending);
            }

            conn.execute(
                "INSERT INTO friend_requests (id, from_user_id, to_user_id, status, requested_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
                (
                    request_id.as_str(),
                    from_id.as_str(),
                    to_id.as_str(),
                    REQUEST_STATUS_PENDING,
                    now.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|_| SendRequestError::DbInsert)?;

            Ok(FriendRequest {
                id: request_id,
                from_user_id: from_id,
                to_user_id: to_id,
                status: REQUEST_STATUS_PENDING.to_string(),
                requested_at: now.clone(),
                updated_at: now,
            })
        })
    })
    .await
    .map_err(|e: SendRequestError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::CREATED, Json(request)))
}

async fn load_request(
    app_state: &AppState,
    request_id: &str,
) -> Result<FriendRequest, (StatusCode, String)> {
    let conn = app_state.main_db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, from_user_id, to_user_id, status, requested_at, updated_at FROM friend_requests WHERE id = ?",
            [request_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to read friend request"))?;

    let row = rows.next().await.map_err(|_| db_error())?.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            "Friend request not found".to_string(),
        )
    })?;

    extract_request_from_row(&row)
        .map_err(|_| db_error_with_context("invalid friend request data"))
}

enum AcceptError {
    Transaction(TransactionError),
    Db,
}

impl From<TransactionError> for AcceptError {
    fn from(e: TransactionError) -> Self {
        AcceptError::Transaction(e)
    }
}

impl From<AcceptError> for (StatusCode, String) {
    fn from(e: AcceptError) -> Self {
        match e {
            AcceptError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            AcceptError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            AcceptError::Db => db_error_with_context("failed to accept friend request"),
        }
    }
}

/// Acceptance is an explicit action by the recipient; the accepted record
/// stays in the history and continues to count against the sender's daily
/// quota.
pub async fn accept_friend_request(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<AcceptRequestPayload>,
) -> Result<(StatusCode, Json<FriendRequest>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;

    let request = load_request(&app_state, &payload.request_id).await?;

    // Authorization: only the recipient can accept
    if current_user.id != request.to_user_id {
        return Err((
            StatusCode::NOT_FOUND,
            "Friend request not found".to_string(),
        ));
    }

    validate_request_transition(&request.status, REQUEST_STATUS_ACCEPTED)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let now = now_rfc3339()?;

    let accepted = with_transaction(&app_state.main_db, |conn| {
        let request = request.clone();
        let now = now.clone();
        Box::pin(async move {
            conn.execute(
                "UPDATE friend_requests SET status = ?, updated_at = ? WHERE id = ?",
                (REQUEST_STATUS_ACCEPTED, now.as_str(), request.id.as_str()),
            )
            .await
            .map_err(|_| AcceptError::Db)?;

            conn.execute(
                "INSERT INTO friendships (user_id, friend_user_id, created_at) VALUES (?, ?, ?)",
                (
                    request.from_user_id.as_str(),
                    request.to_user_id.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|_| AcceptError::Db)?;

            conn.execute(
                "INSERT INTO friendships (user_id, friend_user_id, created_at) VALUES (?, ?, ?)",
                (
                    request.to_user_id.as_str(),
                    request.from_user_id.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|_| AcceptError::Db)?;

            Ok(FriendRequest {
                status: REQUEST_STATUS_ACCEPTED.to_string(),
                updated_at: now,
                ..request
            })
        })
    })
    .await
    .map_err(|e: AcceptError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::OK, Json(accepted)))
}

/// Rejection flips the record to rejected, which frees the sender's quota
/// slot for the day.
pub async fn reject_friend_request(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<RejectRequestPayload>,
) -> Result<(StatusCode, Json<FriendRequest>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;

    let request = load_request(&app_state, &payload.request_id).await?;

    // Authorization: only the recipient can reject
    if current_user.id != request.to_user_id {
        return Err((
            StatusCode::NOT_FOUND,
            "Friend request not found".to_string(),
        ));
    }

    validate_request_transition(&request.status, REQUEST_STATUS_REJECTED)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let now = now_rfc3339()?;

    let conn = app_state.main_db.write().await;
    conn.execute(
        "UPDATE friend_requests SET status = ?, updated_at = ? WHERE id = ?",
        (REQUEST_STATUS_REJECTED, now.as_str(), request.id.as_str()),
    )
    .await
    .map_err(|_| db_error_with_context("failed to reject friend request"))?;

    Ok((
        StatusCode::OK,
        Json(FriendRequest {
            status: REQUEST_STATUS_REJECTED.to_string(),
            updated_at: now,
            ..request
        }),
    ))
}

pub async fn list_friend_requests(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<GetRequestsQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;
    let user_id = &current_user.id;

    let direction = query.direction.as_deref().unwrap_or("incoming");
    match direction {
        "incoming" | "outgoing" => {}
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Invalid direction: {}", direction),
            ));
        }
    }

    if let Some(ref status) = query.status {
        match status.as_str() {
            REQUEST_STATUS_PENDING | REQUEST_STATUS_ACCEPTED | REQUEST_STATUS_REJECTED => {}
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Invalid status: {}", status),
                ));
            }
        }
    }

    let limit = validate_friends_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    let conn = app_state.main_db.read().await;

    let total_count: i64 = {
        let mut count_rows = if let Some(ref status) = query.status {
            if direction == "incoming" {
                conn.query(
                    "SELECT COUNT(*) FROM friend_requests WHERE to_user_id = ? AND status = ?",
                    (user_id.as_str(), status.as_str()),
                )
                .await
            } else {
                conn.query(
                    "SELECT COUNT(*) FROM friend_requests WHERE from_user_id = ? AND status = ?",
                    (user_id.as_str(), status.as_str()),
                )
                .await
            }
        } else if direction == "incoming" {
            conn.query(
                "SELECT COUNT(*) FROM friend_requests WHERE to_user_id = ?",
                [user_id.as_str()],
            )
            .await
        } else {
            conn.query(
                "SELECT COUNT(*) FROM friend_requests WHERE from_user_id = ?",
                [user_id.as_str()],
            )
            .await
        }
        .map_err(|_| db_error_with_context("failed to count friend requests"))?;

        match count_rows.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => 0,
        }
    };

    let mut rows = if let Some(ref status) = query.status {
        if direction == "incoming" {
            conn.query(
                "SELECT id, from_user_id, to_user_id, status, requested_at, updated_at FROM friend_requests WHERE to_user_id = ? AND status = ? ORDER BY requested_at DESC LIMIT ? OFFSET ?",
                (user_id.as_str(), status.as_str(), limit, offset),
            )
            .await
        } else {
            conn.query(
                "SELECT id, from_user_id, to_user_id, status, requested_at, updated_at FROM friend_requests WHERE from_user_id = ? AND status = ? ORDER BY requested_at DESC LIMIT ? OFFSET ?",
                (user_id.as_str(), status.as_str(), limit, offset),
            )
            .await
        }
    } else if direction == "incoming" {
        conn.query(
            "SELECT id, from_user_id, to_user_id, status, requested_at, updated_at FROM friend_requests WHERE to_user_id = ? ORDER BY requested_at DESC LIMIT ? OFFSET ?",
            (user_id.as_str(), limit, offset),
        )
        .await
    } else {
        conn.query(
            "SELECT id, from_user_id, to_user_id, status, requested_at, updated_at FROM friend_requests WHERE from_user_id = ? ORDER BY requested_at DESC LIMIT ? OFFSET ?",
            (user_id.as_str(), limit, offset),
        )
        .await
    }
    .map_err(|_| db_error_with_context("failed to list friend requests"))?;

    let mut requests = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let request = extract_request_from_row(&row)
            .map_err(|_| db_error_with_context("invalid friend request data"))?;
        requests.push(request);
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "requests": requests,
            "total_count": total_count,
            "limit": limit,
            "offset": offset
        })),
    ))
}

pub async fn list_friends(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<ListFriendsQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;
    let user_id = &current_user.id;

    let limit = validate_friends_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    let conn = app_state.main_db.read().await;

    let total_count: i64 = {
        let mut count_rows = conn
            .query(
                "SELECT COUNT(*) FROM friendships WHERE user_id = ?",
                [user_id.as_str()],
            )
            .await
            .map_err(|_| db_error_with_context("failed to count friends"))?;

        match count_rows.next().await.map_err(|_| db_error())? {
            Some(row) => row.get(0).map_err(|_| db_error())?,
            None => 0,
        }
    };

    let mut rows = conn
        .query(
            "SELECT f.friend_user_id, u.name, f.created_at FROM friendships f JOIN users u ON u.id = f.friend_user_id WHERE f.user_id = ? ORDER BY f.created_at DESC LIMIT ? OFFSET ?",
            (user_id.as_str(), limit, offset),
        )
        .await
        .map_err(|_| db_error_with_context("failed to list friends"))?;

    let mut friends = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let user_id: String = row
            .get(0)
            .map_err(|_| db_error_with_context("invalid friendship data"))?;
        let username: String = row
            .get(1)
            .map_err(|_| db_error_with_context("invalid friendship data"))?;
        let since: String = row
            .get(2)
            .map_err(|_| db_error_with_context("invalid friendship data"))?;

        friends.push(Friend {
            user_id,
            username,
            since,
        });
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "friends": friends,
            "total_count": total_count,
            "limit": limit,
            "offset": offset
        })),
    ))
}

/// GET /friends/quota — remaining daily allowance for the settings/compose
/// screens.
pub async fn quota_status(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<QuotaStatus>), (StatusCode, String)> {
    let current_user = get_current_user(&session).await?;

    let premium = is_premium(&app_state.main_db, &current_user.id).await?;
    let quota = daily_friend_request_quota(premium);
    let day_start = today_start_rfc3339()?;

    let conn = app_state.main_db.read().await;
    let used_today = count_requests_today(&conn, &current_user.id, &day_start)
        .await
        .map_err(|_| db_error_with_context("failed to count friend requests"))?;

    Ok((
        StatusCode::OK,
        Json(QuotaStatus {
            daily_quota: quota,
            used_today,
            can_send: used_today < quota,
        }),
    ))
}
