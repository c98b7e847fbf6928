use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use libsql::Connection;
use serde_json::json;
use tower_sessions::Session;
use uuid::Uuid;

use crate::auth::get_current_user;
use crate::constants::*;
use crate::entitlements::is_premium;
use crate::limits;
use crate::models::{CreateEventPayload, Event, EventDetail, GetEventsQuery, GetEventsResponse};
use crate::utils::{
    db_error, db_error_with_context, now_rfc3339, validate_events_limit, validate_offset,
    validate_string_length, validate_timestamp,
};
use crate::{AppState, TransactionError, with_transaction};

pub fn validate_event_title(title: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(title, "Event title", MAX_EVENT_TITLE_LENGTH)
}

pub fn validate_event_location(location: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(location, "Event location", MAX_EVENT_LOCATION_LENGTH)
}

fn extract_event_from_row(row: &libsql::Row) -> Result<Event, libsql::Error> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        starts_at: row.get(4)?,
        capacity: row.get(5)?,
        status: row.get(6)?,
        created_by: row.get(7)?,
        created_at: row.get(8)?,
    })
}

async fn count_rows(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<i64, libsql::Error> {
    let mut rows = conn.query(sql, params).await?;
    match rows.next().await? {
        Some(row) => row.get(0),
        None => Ok(0),
    }
}

enum CreateEventError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    ActiveCapReached(u32),
}

impl From<TransactionError> for CreateEventError {
    fn from(e: TransactionError) -> Self {
        CreateEventError::Transaction(e)
    }
}

impl From<CreateEventError> for (StatusCode, String) {
    fn from(e: CreateEventError) -> Self {
        match e {
            CreateEventError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            CreateEventError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            CreateEventError::DbCheck => db_error_with_context("failed to check active events"),
            CreateEventError::DbInsert => db_error_with_context("event creation failed"),
            CreateEventError::ActiveCapReached(max) => (
                StatusCode::FORBIDDEN,
                format!("Active event limit reached ({} for your plan)", max),
            ),
        }
    }
}

pub async fn create_event(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<CreateEventPayload>,
) -> Result<(StatusCode, Json<Event>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    validate_event_title(&payload.title)?;
    validate_event_location(&payload.location)?;
    validate_timestamp(&payload.starts_at)?;

    if let Some(ref description) = payload.description {
        validate_string_length(description, "Event description", MAX_EVENT_DESCRIPTION_LENGTH)?;
    }

    if payload.capacity == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Capacity must be at least 1".to_string(),
        ));
    }

    let premium = is_premium(&app_state.main_db, &user.id).await?;
    let profile = limits::resolve(premium);

    if payload.capacity > profile.max_participants {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "Capacity cannot exceed {} participants for your plan",
                profile.max_participants
            ),
        ));
    }

    let event_id = Uuid::new_v4().to_string();
    let now = now_rfc3339()?;
    let max_active = profile.max_active_events;

    let event = with_transaction(&app_state.main_db, |conn| {
        let event_id = event_id.clone();
        let user_id = user.id.clone();
        let now = now.clone();
        let payload = payload;
        Box::pin(async move {
            let active_count = count_rows(
                conn,
                "SELECT COUNT(*) FROM events WHERE created_by = ? AND status = ?",
                (user_id.as_str(), EVENT_STATUS_ACTIVE),
            )
            .await
            .map_err(|_| CreateEventError::DbCheck)?;

            if active_count as u32 >= max_active {
                return Err(CreateEventError::ActiveCapReached(max_active));
            }

            let title = payload.title.trim().to_string();
            let location = payload.location.trim().to_string();
            let starts_at = payload.starts_at.trim().to_string();
            let description = payload.description.as_ref().map(|d| d.trim().to_string());

            conn.execute(
                "INSERT INTO events (id, title, description, location, starts_at, capacity, status, created_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    event_id.as_str(),
                    title.as_str(),
                    description.as_deref(),
                    location.as_str(),
                    starts_at.as_str(),
                    payload.capacity,
                    EVENT_STATUS_ACTIVE,
                    user_id.as_str(),
                    now.as_str(),
                ),
            )
            .await
            .map_err(|_| CreateEventError::DbInsert)?;

            Ok(Event {
                id: event_id,
                title,
                description,
                location,
                starts_at,
                capacity: payload.capacity,
                status: EVENT_STATUS_ACTIVE.to_string(),
                created_by: user_id,
                created_at: now,
            })
        })
    })
    .await
    .map_err(|e: CreateEventError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_events(
    State(app_state): State<AppState>,
    session: Session,
    Query(query): Query<GetEventsQuery>,
) -> Result<(StatusCode, Json<GetEventsResponse>), (StatusCode, String)> {
    let _user = get_current_user(&session).await?;

    let limit = validate_events_limit(query.limit)?;
    let offset = validate_offset(query.offset)?;

    if let Some(ref status) = query.status {
        match status.as_str() {
            EVENT_STATUS_ACTIVE | EVENT_STATUS_CANCELLED => {}
            _ => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("Invalid status: {}", status),
                ));
            }
        }
    }

    let search_term = query
        .search
        .as_ref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty());
    if let Some(search) = &search_term {
        validate_string_length(search, "Search term", MAX_SEARCH_TERM_LENGTH)?;
    }

    let search_pattern = search_term.map(|s| format!("%{}%", s));

    let conn = app_state.main_db.read().await;

    let total_count: i64 = {
        match (&search_pattern, &query.status) {
            (Some(pattern), Some(status)) => {
                count_rows(
                    &conn,
                    "SELECT COUNT(*) FROM events WHERE title LIKE ? AND status = ?",
                    (pattern.as_str(), status.as_str()),
                )
                .await
            }
            (Some(pattern), None) => {
                count_rows(
                    &conn,
                    "SELECT COUNT(*) FROM events WHERE title LIKE ?",
                    [pattern.as_str()],
                )
                .await
            }
            (None, Some(status)) => {
                count_rows(
                    &conn,
                    "SELECT COUNT(*) FROM events WHERE status = ?",
                    [status.as_str()],
                )
                .await
            }
            (None, None) => count_rows(&conn, "SELECT COUNT(*) FROM events", ()).await,
        }
        .map_err(|_| db_error_with_context("failed to count events"))?
    };

    let mut rows = match (&search_pattern, &query.status) {
        (Some(pattern), Some(status)) => {
            conn.query(
                "SELECT id, title, description, location, starts_at, capacity, status, created_by, created_at FROM events WHERE title LIKE ? AND status = ? ORDER BY starts_at LIMIT ? OFFSET ?",
                (pattern.as_str(), status.as_str(), limit, offset),
            )
            .await
        }
        (Some(pattern), None) => {
            conn.query(
                "SELECT id, title, description, location, starts_at, capacity, status, created_by, created_at FROM events WHERE title LIKE ? ORDER BY starts_at LIMIT ? OFFSET ?",
                (pattern.as_str(), limit, offset),
            )
            .await
        }
        (None, Some(status)) => {
            conn.query(
                "SELECT id, title, description, location, starts_at, capacity, status, created_by, created_at FROM events WHERE status = ? ORDER BY starts_at LIMIT ? OFFSET ?",
                (status.as_str(), limit, offset),
            )
            .await
        }
        (None, None) => {
            conn.query(
                "SELECT id, title, description, location, starts_at, capacity, status, created_by, created_at FROM events ORDER BY starts_at LIMIT ? OFFSET ?",
                (limit, offset),
            )
            .await
        }
    }
    .map_err(|_| db_error_with_context("failed to list events"))?;

    let mut events = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        let event =
            extract_event_from_row(&row).map_err(|_| db_error_with_context("invalid event data"))?;
        events.push(event);
    }

    Ok((
        StatusCode::OK,
        Json(GetEventsResponse {
            events,
            total_count: total_count as u32,
            limit,
            offset,
        }),
    ))
}

async fn load_event(app_state: &AppState, event_id: &str) -> Result<Event, (StatusCode, String)> {
    let conn = app_state.main_db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, title, description, location, starts_at, capacity, status, created_by, created_at FROM events WHERE id = ?",
            [event_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to read event"))?;

    let row = rows
        .next()
        .await
        .map_err(|_| db_error())?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Event not found".to_string()))?;

    extract_event_from_row(&row).map_err(|_| db_error_with_context("invalid event data"))
}

pub async fn get_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<EventDetail>), (StatusCode, String)> {
    let _user = get_current_user(&session).await?;

    let event = load_event(&app_state, &event_id).await?;

    let conn = app_state.main_db.read().await;
    let participant_count = count_rows(
        &conn,
        "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?",
        [event_id.as_str()],
    )
    .await
    .map_err(|_| db_error_with_context("failed to count participants"))?;

    let favorite_count = count_rows(
        &conn,
        "SELECT COUNT(*) FROM event_favorites WHERE event_id = ?",
        [event_id.as_str()],
    )
    .await
    .map_err(|_| db_error_with_context("failed to count favorites"))?;

    Ok((
        StatusCode::OK,
        Json(EventDetail {
            event,
            participant_count: participant_count as u32,
            favorite_count: favorite_count as u32,
        }),
    ))
}

pub async fn cancel_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<Event>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let event = load_event(&app_state, &event_id).await?;

    if event.created_by != user.id {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the event creator can cancel this event".to_string(),
        ));
    }

    if event.status != EVENT_STATUS_ACTIVE {
        return Err((
            StatusCode::BAD_REQUEST,
            "Event is already cancelled".to_string(),
        ));
    }

    let conn = app_state.main_db.write().await;
    conn.execute(
        "UPDATE events SET status = ? WHERE id = ?",
        (EVENT_STATUS_CANCELLED, event_id.as_str()),
    )
    .await
    .map_err(|_| db_error_with_context("failed to cancel event"))?;

    Ok((
        StatusCode::OK,
        Json(Event {
            status: EVENT_STATUS_CANCELLED.to_string(),
            ..event
        }),
    ))
}

enum RegistrationError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    NotFound,
    Cancelled,
    AlreadyRegistered,
    EventFull,
    CapReached(u32),
}

impl From<TransactionError> for RegistrationError {
    fn from(e: TransactionError) -> Self {
        RegistrationError::Transaction(e)
    }
}

impl From<RegistrationError> for (StatusCode, String) {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            RegistrationError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            RegistrationError::DbCheck => db_error_with_context("failed to check registration"),
            RegistrationError::DbInsert => db_error_with_context("registration failed"),
            RegistrationError::NotFound => {
                (StatusCode::NOT_FOUND, "Event not found".to_string())
            }
            RegistrationError::Cancelled => (
                StatusCode::BAD_REQUEST,
                "Cannot register for a cancelled event".to_string(),
            ),
            RegistrationError::AlreadyRegistered => (
                StatusCode::CONFLICT,
                "Already registered for this event".to_string(),
            ),
            RegistrationError::EventFull => {
                (StatusCode::CONFLICT, "Event is full".to_string())
            }
            RegistrationError::CapReached(max) => (
                StatusCode::FORBIDDEN,
                format!("Registration limit reached ({} for your plan)", max),
            ),
        }
    }
}

pub async fn register_for_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let premium = is_premium(&app_state.main_db, &user.id).await?;
    let max_registrations = limits::resolve(premium).max_registrations;
    let now = now_rfc3339()?;

    let registered_at = with_transaction(&app_state.main_db, |conn| {
        let event_id = event_id.clone();
        let user_id = user.id.clone();
        let now = now.clone();
        Box::pin(async move {
            let mut event_rows = conn
                .query(
                    "SELECT status, capacity FROM events WHERE id = ?",
                    [event_id.as_str()],
                )
                .await
                .map_err(|_| RegistrationError::DbCheck)?;

            let event_row = event_rows
                .next()
                .await
                .map_err(|_| RegistrationError::DbCheck)?
                .ok_or(RegistrationError::NotFound)?;

            let status: String = event_row.get(0).map_err(|_| RegistrationError::DbCheck)?;
            let capacity: u32 = event_row.get(1).map_err(|_| RegistrationError::DbCheck)?;

            if status != EVENT_STATUS_ACTIVE {
                return Err(RegistrationError::Cancelled);
            }

            let mut existing = conn
                .query(
                    "SELECT 1 FROM event_registrations WHERE event_id = ? AND user_id = ?",
                    (event_id.as_str(), user_id.as_str()),
                )
                .await
                .map_err(|_| RegistrationError::DbCheck)?;

            if existing
                .next()
                .await
                .map_err(|_| RegistrationError::DbCheck)?
                .is_some()
            {
                return Err(RegistrationError::AlreadyRegistered);
            }

            let participant_count = count_rows(
                conn,
                "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?",
                [event_id.as_str()],
            )
            .await
            .map_err(|_| RegistrationError::DbCheck)?;

            if participant_count as u32 >= capacity {
                return Err(RegistrationError::EventFull);
            }

            // Only registrations to still-active events count against the cap.
            let registration_count = count_rows(
                conn,
                "SELECT COUNT(*) FROM event_registrations r JOIN events e ON e.id = r.event_id WHERE r.user_id = ? AND e.status = ?",
                (user_id.as_str(), EVENT_STATUS_ACTIVE),
            )
            .await
            .map_err(|_| RegistrationError::DbCheck)?;

            if registration_count as u32 >= max_registrations {
                return Err(RegistrationError::CapReached(max_registrations));
            }

            conn.execute(
                "INSERT INTO event_registrations (event_id, user_id, registered_at) VALUES (?, ?, ?)",
                (event_id.as_str(), user_id.as_str(), now.as_str()),
            )
            .await
            .map_err(|_| RegistrationError::DbInsert)?;

            Ok(now)
        })
    })
    .await
    .map_err(|e: RegistrationError| -> (StatusCode, String) { e.into() })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "event_id": event_id,
            "registered_at": registered_at
        })),
    ))
}

pub async fn unregister_from_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.write().await;
    let affected = conn
        .execute(
            "DELETE FROM event_registrations WHERE event_id = ? AND user_id = ?",
            (event_id.as_str(), user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to remove registration"))?;

    if affected == 0 {
        return Err((
            StatusCode::NOT_FOUND,
            "Registration not found".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

enum FavoriteError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    NotFound,
    AlreadyFavorited,
    CapReached(u32),
}

impl From<TransactionError> for FavoriteError {
    fn from(e: TransactionError) -> Self {
        FavoriteError::Transaction(e)
    }
}

impl From<FavoriteError> for (StatusCode, String) {
    fn from(e: FavoriteError) -> Self {
        match e {
            FavoriteError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            FavoriteError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            FavoriteError::DbCheck => db_error_with_context("failed to check favorite"),
            FavoriteError::DbInsert => db_error_with_context("favorite failed"),
            FavoriteError::NotFound => (StatusCode::NOT_FOUND, "Event not found".to_string()),
            FavoriteError::AlreadyFavorited => (
                StatusCode::CONFLICT,
                "Event is already in favorites".to_string(),
            ),
            FavoriteError::CapReached(max) => (
                StatusCode::FORBIDDEN,
                format!("Favorite limit reached ({} for your plan)", max),
            ),
        }
    }
}

pub async fn favorite_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let premium = is_premium(&app_state.main_db, &user.id).await?;
    let max_favorites = limits::resolve(premium).max_favorites;
    let now = now_rfc3339()?;

    let favorited_at = with_transaction(&app_state.main_db, |conn| {
        let event_id = event_id.clone();
        let user_id = user.id.clone();
        let now = now.clone();
        Box::pin(async move {
            let mut event_rows = conn
                .query("SELECT 1 FROM events WHERE id = ?", [event_id.as_str()])
                .await
                .map_err(|_| FavoriteError::DbCheck)?;

            if event_rows
                .next()
                .await
                .map_err(|_| FavoriteError::DbCheck)?
                .is_none()
            {
                return Err(FavoriteError::NotFound);
            }

            let mut existing = conn
                .query(
                    "SELECT 1 FROM event_favorites WHERE event_id = ? AND user_id = ?",
                    (event_id.as_str(), user_id.as_str()),
                )
                .await
                .map_err(|_| FavoriteError::DbCheck)?;

            if existing
                .next()
                .await
                .map_err(|_| FavoriteError::DbCheck)?
                .is_some()
            {
                return Err(FavoriteError::AlreadyFavorited);
            }

            let favorite_count = count_rows(
                conn,
                "SELECT COUNT(*) FROM event_favorites WHERE user_id = ?",
                [user_id.as_str()],
            )
            .await
            .map_err(|_| FavoriteError::DbCheck)?;

            if favorite_count as u32 >= max_favorites {
                return Err(FavoriteError::CapReached(max_favorites));
            }

            conn.execute(
                "INSERT INTO event_favorites (event_id, user_id, favorited_at) VALUES (?, ?, ?)",
                (event_id.as_str(), user_id.as_str(), now.as_str()),
            )
            .await
            .map_err(|_| FavoriteError::DbInsert)?;

            Ok(now)
        })
    })
    .await
    .map_err(|e: FavoriteError| -> (StatusCode, String) { e.into() })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "event_id": event_id,
            "favorited_at": favorited_at
        })),
    ))
}

pub async fn unfavorite_event(
    State(app_state): State<AppState>,
    session: Session,
    Path(event_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let user = get_current_user(&session).await?;

    let conn = app_state.main_db.write().await;
    let affected = conn
        .execute(
            "DELETE FROM event_favorites WHERE event_id = ? AND user_id = ?",
            (event_id.as_str(), user.id.as_str()),
        )
        .await
        .map_err(|_| db_error_with_context("failed to remove favorite"))?;

    if affected == 0 {
        return Err((StatusCode::NOT_FOUND, "Favorite not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}
