use serde::Serialize;

/// Numeric caps applicable to one account tier.
///
/// Exactly two instances exist (`FREE_LIMITS`, `PREMIUM_LIMITS`); selection
/// is a pure function of premium status via [`resolve`].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitProfile {
    pub max_participants: u32,
    pub max_registrations: u32,
    pub max_favorites: u32,
    pub max_active_events: u32,
}

pub const FREE_LIMITS: LimitProfile = LimitProfile {
    max_participants: 50,
    max_registrations: 5,
    max_favorites: 10,
    max_active_events: 2,
};

pub const PREMIUM_LIMITS: LimitProfile = LimitProfile {
    max_participants: 500,
    max_registrations: 100,
    max_favorites: 200,
    max_active_events: 20,
};

/// Daily friend request quota per tier. Premium is effectively unbounded.
pub const FREE_DAILY_FRIEND_REQUESTS: u32 = 1;
pub const PREMIUM_DAILY_FRIEND_REQUESTS: u32 = u32::MAX;

/// Selects the limit profile for an account tier. Total over its domain:
/// no side effects, no failure modes.
pub fn resolve(is_premium: bool) -> &'static LimitProfile {
    if is_premium { &PREMIUM_LIMITS } else { &FREE_LIMITS }
}

pub fn daily_friend_request_quota(is_premium: bool) -> u32 {
    if is_premium {
        PREMIUM_DAILY_FRIEND_REQUESTS
    } else {
        FREE_DAILY_FRIEND_REQUESTS
    }
}
