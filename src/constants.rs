// Server configuration
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: &str = "3000";
pub const DEFAULT_DATA_PATH: &str = "data";

// Session configuration
pub const SESSION_NAME: &str = "gatherly_session";
pub const SESSION_USER_KEY: &str = "user";
pub const SESSION_EXPIRY_DAYS: i64 = 30;
pub const MIN_SESSION_SECRET_LENGTH: usize = 64;

// Query limits and defaults
pub const DEFAULT_EVENTS_LIMIT: u32 = 50;
pub const DEFAULT_FRIENDS_LIMIT: u32 = 100;
pub const DEFAULT_MESSAGES_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;
pub const MAX_OFFSET: u32 = 1_000_000;

// Validation limits
pub const MAX_EVENT_TITLE_LENGTH: usize = 120;
pub const MAX_EVENT_LOCATION_LENGTH: usize = 160;
pub const MAX_EVENT_DESCRIPTION_LENGTH: usize = 2000;
pub const MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_SEARCH_TERM_LENGTH: usize = 100;
pub const MAX_USERNAME_LENGTH: usize = 50;
pub const MIN_USERNAME_LENGTH: usize = 4;
pub const MIN_PASSWORD_LENGTH: usize = 6;

// Friend request status FSM
pub const REQUEST_STATUS_PENDING: &str = "pending";
pub const REQUEST_STATUS_ACCEPTED: &str = "accepted";
pub const REQUEST_STATUS_REJECTED: &str = "rejected";

// Event status
pub const EVENT_STATUS_ACTIVE: &str = "active";
pub const EVENT_STATUS_CANCELLED: &str = "cancelled";

// Entitlement flags
//
// The premium flag doubles as the account tier: every restriction below
// evaluates to inactive while it is set. Unknown keys read as false; that
// contract lives in `entitlements::flag_value`.
pub const FLAG_IS_PREMIUM: &str = "is_premium";

// Compiled-in defaults: (key, value, category, is_togglable).
// New-account seeding and `reset` both restore exactly this table.
pub const DEFAULT_ENTITLEMENT_FLAGS: &[(&str, bool, &str, bool)] = &[
    (FLAG_IS_PREMIUM, false, "account", true),
    ("show_ads", true, "general", false),
    ("restrict_event_creation", true, "events", true),
    ("restrict_event_reminders", true, "events", true),
    ("restrict_group_messaging", true, "messaging", true),
    ("restrict_profile_badges", false, "profile", true),
];

// Error messages
pub const ERR_DATABASE_OPERATION: &str = "Database operation failed";
pub const ERR_INVALID_SESSION: &str = "Invalid session";
pub const ERR_UNAUTHORIZED: &str = "Not logged in";
