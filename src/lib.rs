pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod entitlements;
pub mod events;
pub mod friends;
pub mod limits;
pub mod messages;
pub mod models;
pub mod utils;

// Re-export types at crate root for convenient importing
pub use crate::database::{Db, TransactionError, with_transaction};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Main database holding users, entitlements and all social data
    pub main_db: Db,
}
