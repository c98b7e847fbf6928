use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use axum::{Json, extract::State, http::StatusCode};
use password_hash::rand_core::OsRng;
use tower_sessions::Session;
use uuid::Uuid;

use crate::constants::*;
use crate::entitlements::seed_default_flags;
use crate::models::{LoginPayload, PublicUser, RegisterPayload, User};
use crate::utils::{db_error_with_context, now_rfc3339, validate_string_length};
use crate::{AppState, Db, TransactionError, with_transaction};

/// Reads the logged-in user from the session.
pub async fn get_current_user(session: &Session) -> Result<User, (StatusCode, String)> {
    session
        .get::<User>(SESSION_USER_KEY)
        .await
        .map_err(|_| (StatusCode::UNAUTHORIZED, ERR_INVALID_SESSION.to_string()))?
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()))
}

pub async fn get_user_by_username(db: &Db, username: &str) -> anyhow::Result<Option<User>> {
    let conn = db.read().await;
    let mut rows = conn
        .query(
            "SELECT id, name, password_hash FROM users WHERE name = ?",
            [username],
        )
        .await?;

    match rows.next().await? {
        Some(row) => {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            let password_hash: String = row.get(2)?;
            Ok(Some(User {
                id,
                username,
                password_hash,
            }))
        }
        None => Ok(None),
    }
}

pub async fn get_user_by_username_public(
    db: &Db,
    username: &str,
) -> anyhow::Result<Option<PublicUser>> {
    Ok(get_user_by_username(db, username).await?.map(|u| PublicUser {
        id: u.id,
        username: u.username,
    }))
}

pub async fn get_user_by_id_public(db: &Db, user_id: &str) -> anyhow::Result<Option<PublicUser>> {
    let conn = db.read().await;
    let mut rows = conn
        .query("SELECT id, name FROM users WHERE id = ?", [user_id])
        .await?;

    match rows.next().await? {
        Some(row) => {
            let id: String = row.get(0)?;
            let username: String = row.get(1)?;
            Ok(Some(PublicUser { id, username }))
        }
        None => Ok(None),
    }
}

fn validate_username(username: &str) -> Result<(), (StatusCode, String)> {
    validate_string_length(username, "Username", MAX_USERNAME_LENGTH)?;
    if username.trim().len() < MIN_USERNAME_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Username must be at least {} characters", MIN_USERNAME_LENGTH),
        ));
    }
    Ok(())
}

enum RegisterError {
    Transaction(TransactionError),
    DbCheck,
    DbInsert,
    Conflict,
}

impl From<TransactionError> for RegisterError {
    fn from(e: TransactionError) -> Self {
        RegisterError::Transaction(e)
    }
}

impl From<RegisterError> for (StatusCode, String) {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::Transaction(TransactionError::Begin) => {
                db_error_with_context("failed to begin transaction")
            }
            RegisterError::Transaction(TransactionError::Commit) => {
                db_error_with_context("failed to commit transaction")
            }
            RegisterError::DbCheck => db_error_with_context("failed to check existing user"),
            RegisterError::DbInsert => db_error_with_context("user creation failed"),
            RegisterError::Conflict => (
                StatusCode::CONFLICT,
                "Username already taken".to_string(),
            ),
        }
    }
}

pub async fn register(
    State(app_state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    validate_username(&payload.username)?;

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        ));
    }

    let username = payload.username.trim().to_string();

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })?
        .to_string();

    let user_id = Uuid::new_v4().to_string();
    let now = now_rfc3339()?;

    // User row and entitlement defaults are seeded atomically so no account
    // ever exists without its flag table.
    let user = with_transaction(&app_state.main_db, |conn| {
        let user_id = user_id.clone();
        let username = username.clone();
        let password_hash = password_hash.clone();
        let now = now.clone();
        Box::pin(async move {
            let mut existing_rows = conn
                .query("SELECT id FROM users WHERE name = ?", [username.as_str()])
                .await
                .map_err(|_| RegisterError::DbCheck)?;

            if existing_rows
                .next()
                .await
                .map_err(|_| RegisterError::DbCheck)?
                .is_some()
            {
                return Err(RegisterError::Conflict);
            }

            conn.execute(
                "INSERT INTO users (id, name, password_hash) VALUES (?, ?, ?)",
                (user_id.as_str(), username.as_str(), password_hash.as_str()),
            )
            .await
            .map_err(|_| RegisterError::DbInsert)?;

            seed_default_flags(conn, &user_id, &now)
                .await
                .map_err(|_| RegisterError::DbInsert)?;

            Ok(PublicUser {
                id: user_id,
                username,
            })
        })
    })
    .await
    .map_err(|e: RegisterError| -> (StatusCode, String) { e.into() })?;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(app_state): State<AppState>,
    session: Session,
    Json(payload): Json<LoginPayload>,
) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let user = get_user_by_username(&app_state.main_db, payload.username.trim())
        .await
        .map_err(|_| db_error_with_context("failed to look up user"))?
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                "Invalid username or password".to_string(),
            )
        })?;

    let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Stored credentials are invalid".to_string(),
        )
    })?;

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Invalid username or password".to_string(),
        ));
    }

    session
        .insert(SESSION_USER_KEY, user.clone())
        .await
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;

    Ok((
        StatusCode::OK,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn me(session: Session) -> Result<(StatusCode, Json<PublicUser>), (StatusCode, String)> {
    let user = get_current_user(&session).await?;
    Ok((
        StatusCode::OK,
        Json(PublicUser {
            id: user.id,
            username: user.username,
        }),
    ))
}

pub async fn logout(session: Session) -> Result<StatusCode, (StatusCode, String)> {
    session.flush().await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to clear session".to_string(),
        )
    })?;
    Ok(StatusCode::NO_CONTENT)
}
