use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use libsql::Connection;
use tower_sessions::Session;

use crate::auth::get_current_user;
use crate::constants::*;
use crate::limits;
use crate::models::{EntitlementFlag, EntitlementsResponse, RestrictionResponse, ToggleFlagPayload};
use crate::utils::{db_error, db_error_with_context, now_rfc3339};
use crate::{AppState, Db, TransactionError, with_transaction};

/// Compiled-in default for a flag key; unknown keys default to false.
pub fn default_flag_value(key: &str) -> bool {
    DEFAULT_ENTITLEMENT_FLAGS
        .iter()
        .find(|(k, _, _, _)| *k == key)
        .map(|(_, value, _, _)| *value)
        .unwrap_or(false)
}

/// Writes the compiled-in default table for a user, replacing any rows that
/// already exist. Used at registration and by `reset`.
pub async fn seed_default_flags(
    conn: &Connection,
    user_id: &str,
    now: &str,
) -> Result<(), libsql::Error> {
    for (key, value, category, is_togglable) in DEFAULT_ENTITLEMENT_FLAGS {
        conn.execute(
            "INSERT OR REPLACE INTO entitlement_flags (user_id, key, value, category, is_togglable, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            (user_id, *key, *value, *category, *is_togglable, now),
        )
        .await?;
    }
    Ok(())
}

/// Stored value of a single flag.
///
/// Contract: a key with no stored row reads as `false`. A row whose value
/// column cannot be decoded falls back to the compiled-in default for that
/// key.
pub async fn flag_value(
    db: &Db,
    user_id: &str,
    key: &str,
) -> Result<bool, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT value FROM entitlement_flags WHERE user_id = ? AND key = ?",
            (user_id, key),
        )
        .await
        .map_err(|_| db_error_with_context("failed to read entitlement flag"))?;

    match rows.next().await.map_err(|_| db_error())? {
        Some(row) => Ok(row.get::<bool>(0).unwrap_or_else(|_| default_flag_value(key))),
        None => Ok(false),
    }
}

pub async fn is_premium(db: &Db, user_id: &str) -> Result<bool, (StatusCode, String)> {
    flag_value(db, user_id, FLAG_IS_PREMIUM).await
}

/// The restriction evaluator: premium accounts are never restricted;
/// otherwise the stored flag value applies, with unknown keys reading as
/// unrestricted.
pub async fn is_restricted_value(
    db: &Db,
    user_id: &str,
    key: &str,
) -> Result<bool, (StatusCode, String)> {
    if is_premium(db, user_id).await? {
        return Ok(false);
    }
    flag_value(db, user_id, key).await
}

fn extract_flag_from_row(row: &libsql::Row) -> Result<EntitlementFlag, libsql::Error> {
    Ok(EntitlementFlag {
        key: row.get(0)?,
        value: row.get(1)?,
        category: row.get(2)?,
        is_togglable: row.get(3)?,
    })
}

/// Loads the user's full flag table. `Ok(None)` signals missing or
/// undecodable rows, in which case the caller falls back to reseeding the
/// compiled-in defaults.
async fn load_flags(
    db: &Db,
    user_id: &str,
) -> Result<Option<Vec<EntitlementFlag>>, (StatusCode, String)> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT key, value, category, is_togglable FROM entitlement_flags WHERE user_id = ? ORDER BY category, key",
            [user_id],
        )
        .await
        .map_err(|_| db_error_with_context("failed to read entitlement flags"))?;

    let mut flags = Vec::new();
    while let Some(row) = rows.next().await.map_err(|_| db_error())? {
        match extract_flag_from_row(&row) {
            Ok(flag) => flags.push(flag),
            Err(_) => return Ok(None),
        }
    }

    if flags.is_empty() {
        return Ok(None);
    }

    Ok(Some(flags))
}

enum ResetError {
    Transaction(TransactionError),
    Db,
}

impl From<TransactionError> for ResetError {
    fn from(e: TransactionError) -> Self {
        ResetError::Transaction(e)
    }
}

impl From<ResetError> for (StatusCode, String) {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            ResetError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            ResetError::Db => db_error_with_context("failed to reset entitlement flags"),
        }
    }
}

/// Replaces the user's flag table with the compiled-in defaults.
pub async fn reset_flags_for_user(db: &Db, user_id: &str) -> Result<(), (StatusCode, String)> {
    let now = now_rfc3339()?;

    with_transaction(db, |conn| {
        let user_id = user_id.to_string();
        let now = now.clone();
        Box::pin(async move {
            conn.execute(
                "DELETE FROM entitlement_flags WHERE user_id = ?",
                [user_id.as_str()],
            )
            .await
            .map_err(|_| ResetError::Db)?;

            seed_default_flags(conn, &user_id, &now)
                .await
                .map_err(|_| ResetError::Db)?;

            Ok(())
        })
    })
    .await
    .map_err(|e: ResetError| -> (StatusCode, String) { e.into() })
}

/// GET /entitlements — the settings screen payload: all flags plus derived
/// premium status and the resolved limit profile.
pub async fn get_entitlements(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<EntitlementsResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let db = &app_state.main_db;

    let flags = match load_flags(db, &user.id).await? {
        Some(flags) => flags,
        None => {
            // Missing or corrupt persisted state: restore defaults.
            reset_flags_for_user(db, &user.id).await?;
            load_flags(db, &user.id)
                .await?
                .ok_or_else(|| db_error_with_context("failed to reseed entitlement flags"))?
        }
    };

    let premium = flags
        .iter()
        .find(|f| f.key == FLAG_IS_PREMIUM)
        .map(|f| f.value)
        .unwrap_or(false);

    Ok((
        StatusCode::OK,
        Json(EntitlementsResponse {
            flags,
            is_premium: premium,
            limits: *limits::resolve(premium),
        }),
    ))
}

/// POST /entitlements/toggle — flips one flag and persists immediately.
///
/// Unlike the read path, unknown keys here are an explicit error so typos
/// surface instead of silently creating state.
pub async fn toggle_flag(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<ToggleFlagPayload>,
) -> Result<(StatusCode, Json<EntitlementFlag>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let key = payload.key.trim();

    if key.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Flag key cannot be empty".to_string(),
        ));
    }

    let db = &app_state.main_db;

    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT key, value, category, is_togglable FROM entitlement_flags WHERE user_id = ? AND key = ?",
            (user.id.as_str(), key),
        )
        .await
        .map_err(|_| db_error_with_context("failed to read entitlement flag"))?;

    let row = rows
        .next()
        .await
        .map_err(|_| db_error())?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Unknown entitlement flag: {}", key),
            )
        })?;

    let flag = extract_flag_from_row(&row)
        .map_err(|_| db_error_with_context("invalid entitlement flag data"))?;

    drop(rows);
    drop(conn);

    if !flag.is_togglable {
        return Err((
            StatusCode::FORBIDDEN,
            format!("Flag {} cannot be toggled", flag.key),
        ));
    }

    let new_value = !flag.value;
    let now = now_rfc3339()?;

    let conn = db.write().await;
    conn.execute(
        "UPDATE entitlement_flags SET value = ?, updated_at = ? WHERE user_id = ? AND key = ?",
        (new_value, now.as_str(), user.id.as_str(), flag.key.as_str()),
    )
    .await
    .map_err(|_| db_error_with_context("failed to update entitlement flag"))?;

    Ok((
        StatusCode::OK,
        Json(EntitlementFlag {
            value: new_value,
            ..flag
        }),
    ))
}

/// POST /entitlements/reset
pub async fn reset_flags(
    State(app_state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<EntitlementsResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    reset_flags_for_user(&app_state.main_db, &user.id).await?;

    get_entitlements(State(app_state), session).await
}

/// GET /entitlements/restrictions/{key} — evaluated restriction state.
pub async fn get_restriction(
    State(app_state): State<AppState>,
    session: Session,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<RestrictionResponse>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    let restricted = is_restricted_value(&app_state.main_db, &user.id, &key).await?;

    Ok((
        StatusCode::OK,
        Json(RestrictionResponse { key, restricted }),
    ))
}
