use anyhow::Result;
use libsql::{Builder, Connection};
use std::future::Future;
use std::pin::Pin;
use std::{path::Path, sync::Arc};
use tokio::sync::RwLock;

const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id             TEXT    PRIMARY KEY,
    name           TEXT    UNIQUE NOT NULL,
    password_hash  TEXT    NOT NULL
);
"#;

const CREATE_ENTITLEMENT_FLAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entitlement_flags (
    user_id      TEXT    NOT NULL,
    key          TEXT    NOT NULL,
    value        BOOLEAN NOT NULL,
    category     TEXT    NOT NULL,
    is_togglable BOOLEAN NOT NULL,
    updated_at   TEXT    NOT NULL,
    PRIMARY KEY (user_id, key),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

const CREATE_FRIEND_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS friend_requests (
    id           TEXT PRIMARY KEY,
    from_user_id TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,
    status       TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    FOREIGN KEY (from_user_id) REFERENCES users(id),
    FOREIGN KEY (to_user_id) REFERENCES users(id)
);
"#;

const CREATE_FRIENDSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS friendships (
    user_id        TEXT NOT NULL,
    friend_user_id TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    PRIMARY KEY (user_id, friend_user_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (friend_user_id) REFERENCES users(id)
);
"#;

const CREATE_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS events (
    id          TEXT    PRIMARY KEY,
    title       TEXT    NOT NULL,
    description TEXT,
    location    TEXT    NOT NULL,
    starts_at   TEXT    NOT NULL,
    capacity    INTEGER NOT NULL,
    status      TEXT    NOT NULL,
    created_by  TEXT    NOT NULL,
    created_at  TEXT    NOT NULL,
    FOREIGN KEY (created_by) REFERENCES users(id)
);
"#;

const CREATE_EVENT_REGISTRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_registrations (
    event_id      TEXT NOT NULL,
    user_id       TEXT NOT NULL,
    registered_at TEXT NOT NULL,
    PRIMARY KEY (event_id, user_id),
    FOREIGN KEY (event_id) REFERENCES events(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

const CREATE_EVENT_FAVORITES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS event_favorites (
    event_id     TEXT NOT NULL,
    user_id      TEXT NOT NULL,
    favorited_at TEXT NOT NULL,
    PRIMARY KEY (event_id, user_id),
    FOREIGN KEY (event_id) REFERENCES events(id),
    FOREIGN KEY (user_id) REFERENCES users(id)
);
"#;

const CREATE_MESSAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id           TEXT PRIMARY KEY,
    from_user_id TEXT NOT NULL,
    to_user_id   TEXT NOT NULL,
    body         TEXT NOT NULL,
    sent_at      TEXT NOT NULL,
    FOREIGN KEY (from_user_id) REFERENCES users(id),
    FOREIGN KEY (to_user_id) REFERENCES users(id)
);
"#;

// The sender+day index backs the daily quota count; requests are never
// deleted, so the range scan must not degrade into a full-table filter.
const CREATE_FRIEND_REQUESTS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_friend_requests_sender_day
ON friend_requests(from_user_id, requested_at);
"#;

const CREATE_EVENTS_CREATOR_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_creator_status ON events(created_by, status);
"#;

const CREATE_EVENTS_TITLE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_title ON events(title);
"#;

const CREATE_REGISTRATIONS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_event_registrations_user ON event_registrations(user_id);
"#;

const CREATE_FAVORITES_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_event_favorites_user ON event_favorites(user_id);
"#;

const CREATE_MESSAGES_PAIR_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_pair ON messages(from_user_id, to_user_id, sent_at);
"#;

pub type Db = Arc<RwLock<Connection>>;

/// Main application DB (gatherly.db)
pub async fn init_main_db(data_dir: &str) -> Result<Db> {
    tokio::fs::create_dir_all(data_dir).await?;
    let path = Path::new(data_dir).join("gatherly.db");
    let db = Builder::new_local(path).build().await?;
    let conn = db.connect()?;

    conn.execute(CREATE_USERS_TABLE, ()).await?;
    conn.execute(CREATE_ENTITLEMENT_FLAGS_TABLE, ()).await?;
    conn.execute(CREATE_FRIEND_REQUESTS_TABLE, ()).await?;
    conn.execute(CREATE_FRIENDSHIPS_TABLE, ()).await?;
    conn.execute(CREATE_EVENTS_TABLE, ()).await?;
    conn.execute(CREATE_EVENT_REGISTRATIONS_TABLE, ()).await?;
    conn.execute(CREATE_EVENT_FAVORITES_TABLE, ()).await?;
    conn.execute(CREATE_MESSAGES_TABLE, ()).await?;
    conn.execute(CREATE_FRIEND_REQUESTS_INDEX, ()).await?;
    conn.execute(CREATE_EVENTS_CREATOR_INDEX, ()).await?;
    conn.execute(CREATE_EVENTS_TITLE_INDEX, ()).await?;
    conn.execute(CREATE_REGISTRATIONS_USER_INDEX, ()).await?;
    conn.execute(CREATE_FAVORITES_USER_INDEX, ()).await?;
    conn.execute(CREATE_MESSAGES_PAIR_INDEX, ()).await?;

    Ok(Arc::new(RwLock::new(conn)))
}

/// Execute a function within a database transaction, returning handler-compatible errors
///
/// The closure must return a boxed future to handle lifetime issues with async closures.
pub async fn with_transaction<F, T, E>(db_conn: &Db, f: F) -> Result<T, E>
where
    F: for<'a> FnOnce(&'a Connection) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
    E: From<TransactionError>,
{
    // Acquire write lock for exclusive access during transaction
    let conn = db_conn.write().await;

    conn.execute("BEGIN TRANSACTION", ())
        .await
        .map_err(|_| TransactionError::Begin)?;

    match f(&*conn).await {
        Ok(result) => {
            conn.execute("COMMIT", ())
                .await
                .map_err(|_| TransactionError::Commit)?;
            Ok(result)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}

/// Errors that can occur during transaction management
#[derive(Debug)]
pub enum TransactionError {
    Begin,
    Commit,
}
