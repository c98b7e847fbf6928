use serde::{Deserialize, Serialize};

use crate::limits::LimitProfile;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    // Never serialized into responses; defaults when absent so the session
    // round-trip (which stores the serialized form) still decodes.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

#[derive(Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
}

#[derive(Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EntitlementFlag {
    pub key: String,
    pub value: bool,
    pub category: String,
    pub is_togglable: bool,
}

#[derive(Serialize)]
pub struct EntitlementsResponse {
    pub flags: Vec<EntitlementFlag>,
    pub is_premium: bool,
    pub limits: LimitProfile,
}

#[derive(Deserialize)]
pub struct ToggleFlagPayload {
    pub key: String,
}

#[derive(Serialize)]
pub struct RestrictionResponse {
    pub key: String,
    pub restricted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub starts_at: String,
    pub capacity: u32,
    pub status: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Deserialize)]
pub struct CreateEventPayload {
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub starts_at: String,
    pub capacity: u32,
}

#[derive(Deserialize)]
pub struct GetEventsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct GetEventsResponse {
    pub events: Vec<Event>,
    pub total_count: u32,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Serialize)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub participant_count: u32,
    pub favorite_count: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FriendRequest {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: String,
    pub requested_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendFriendRequestPayload {
    pub to_username: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AcceptRequestPayload {
    pub request_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RejectRequestPayload {
    pub request_id: String,
}

#[derive(Deserialize)]
pub struct GetRequestsQuery {
    pub direction: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Deserialize)]
pub struct ListFriendsQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Friend {
    pub user_id: String,
    pub username: String,
    pub since: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuotaStatus {
    pub daily_quota: u32,
    pub used_today: u32,
    pub can_send: bool,
}

#[derive(Deserialize)]
pub struct SendMessagePayload {
    pub to_id: String,
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub body: String,
    pub sent_at: String,
}

#[derive(Deserialize)]
pub struct ConversationQuery {
    pub friend_id: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub messages: Vec<Message>,
    pub total_count: u32,
    pub limit: u32,
    pub offset: u32,
}
