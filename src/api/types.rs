//! Request and response types for the practice-room backend API.
//!
//! The backend speaks snake_case JSON, so no renaming is applied.

use serde::{Deserialize, Deserializer};

/// Accepts an id sent either as a JSON string or as a number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// Response from POST /refresh.
///
/// `access_token` is optional so a body without it is a refresh failure
/// rather than a decode error.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Response from GET /validateToken.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    /// Student number, used as the owner key for reservation records.
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    /// Remaining profile fields, kept verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Lifecycle of a reservation as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Cancelled,
    InProgress,
    Completed,
    #[serde(other)]
    Unknown,
}

/// Check-in state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    Unverified,
    Verified,
    Failed,
    #[serde(other)]
    Unknown,
}

/// One entry from GET /reservations/user/{user_id}.
///
/// Timestamps are server-formatted as `YYYY-MM-DD-HH-MM-SS`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRecord {
    pub id: i64,
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    pub start_time: String,
    pub end_time: String,
    pub room_id: i64,
    pub status: ReservationStatus,
    pub location_status: LocationStatus,
    pub created_at: String,
}

impl ReservationRecord {
    /// Only reservations still in the `reserved` state can be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.status == ReservationStatus::Reserved
    }

    /// Check-in is possible until it has been verified or has lapsed.
    pub fn can_verify(&self) -> bool {
        self.location_status == LocationStatus::Unverified
    }
}

/// Body returned by the cancel and verify endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}
