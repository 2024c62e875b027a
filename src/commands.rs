//! Reservation and account operations on top of the request pipeline.
//!
//! These are what the front end calls: session validation, reservation
//! history, cancellation, location check-in, and logout. Pipeline outcomes
//! that did not produce a response are turned into `ClientError`.

use reqwest::{Response, StatusCode};
use thiserror::Error;

use crate::api::auth::{CredentialStore, KeychainError, TokenKind};
use crate::api::client::{ApiRequest, Outcome};
use crate::api::types::{MessageResponse, ReservationRecord, UserProfile};
use crate::location::{Coordinates, TooFar};
use crate::session::{AuthAction, AuthDispatcher};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Signed out, log in again")]
    SignedOut,
    #[error("Request timed out")]
    Timeout,
    #[error("Server unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("Server rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("Failed to parse server response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("Check-in failed: {0}")]
    TooFar(#[from] TooFar),
    #[error("No check-in location configured (set CHECKIN_LATITUDE and CHECKIN_LONGITUDE)")]
    NoCheckInSite,
    #[error(transparent)]
    Keychain(#[from] KeychainError),
}

fn into_response(outcome: Outcome) -> Result<Response, ClientError> {
    match outcome {
        Outcome::Response(r) => Ok(r),
        Outcome::Aborted => Err(ClientError::Timeout),
        Outcome::SignedOut => Err(ClientError::SignedOut),
        Outcome::Unreachable(e) => Err(ClientError::Unreachable(e)),
    }
}

/// Server `message` field, or an empty string if the body has none.
async fn read_message(resp: Response) -> String {
    resp.json::<MessageResponse>()
        .await
        .ok()
        .and_then(|m| m.message)
        .unwrap_or_default()
}

async fn rejected(resp: Response) -> ClientError {
    let status = resp.status();
    let message = read_message(resp).await;
    ClientError::Rejected { status, message }
}

/// Persist a freshly issued token pair and mark the session signed in.
pub fn store_tokens(
    state: &AppState,
    access_token: &str,
    refresh_token: &str,
) -> Result<(), ClientError> {
    state.store.set(TokenKind::Access, access_token)?;
    state.store.set(TokenKind::Refresh, refresh_token)?;
    state.session.dispatch(AuthAction::SignIn);
    Ok(())
}

/// Confirm the session is still valid and fetch the user's profile.
///
/// A non-success answer ends the session.
pub async fn validate_token(state: &AppState) -> Result<UserProfile, ClientError> {
    let resp = into_response(state.api.request(&ApiRequest::get("validateToken")).await)?;

    if !resp.status().is_success() {
        log::warn!("Token validation failed with status {}", resp.status());
        state.session.dispatch(AuthAction::SignOut);
        return Err(ClientError::SignedOut);
    }

    resp.json().await.map_err(ClientError::Decode)
}

/// Reservation history for a user, as returned by the server.
pub async fn fetch_records(
    state: &AppState,
    user_id: &str,
) -> Result<Vec<ReservationRecord>, ClientError> {
    let req = ApiRequest::get(format!("reservations/user/{}", user_id));
    let resp = into_response(state.api.request(&req).await)?;

    if !resp.status().is_success() {
        return Err(rejected(resp).await);
    }

    resp.json().await.map_err(ClientError::Decode)
}

/// PUT a reservation action with the `reservation_id` form body.
async fn put_reservation_action(
    state: &AppState,
    endpoint: String,
    reservation_id: i64,
) -> Result<String, ClientError> {
    let id = reservation_id.to_string();
    let req = ApiRequest::put(endpoint).form(&[("reservation_id", id.as_str())]);
    let resp = into_response(state.api.request(&req).await)?;

    if !resp.status().is_success() {
        return Err(rejected(resp).await);
    }

    Ok(read_message(resp).await)
}

/// Cancel a reservation. Returns the server's confirmation message.
pub async fn cancel_reservation(state: &AppState, reservation_id: i64) -> Result<String, ClientError> {
    log::info!("Cancelling reservation {}", reservation_id);
    put_reservation_action(state, format!("reservations/{}", reservation_id), reservation_id).await
}

/// Check in to a reservation from `position`.
///
/// The distance to the practice room is checked locally first; the server is
/// only contacted when the user is within range. Returns the distance in
/// meters and the server's message.
pub async fn verify_location(
    state: &AppState,
    reservation_id: i64,
    position: Coordinates,
) -> Result<(f64, String), ClientError> {
    let site = state.checkin_site.ok_or(ClientError::NoCheckInSite)?;
    let distance = site.check(position)?;

    log::info!(
        "Verifying reservation {} at {:.1}m from the practice room",
        reservation_id,
        distance
    );
    let message = put_reservation_action(
        state,
        format!("reservations/verify/{}", reservation_id),
        reservation_id,
    )
    .await?;
    Ok((distance, message))
}

/// Logout: notify the server (best-effort), clear both tokens, sign out.
///
/// Returns `false` without doing anything if no refresh token is stored.
pub async fn logout(state: &AppState) -> Result<bool, ClientError> {
    if state.store.get(TokenKind::Refresh)?.is_none() {
        log::warn!("Refresh token not found, nothing to log out");
        return Ok(false);
    }

    log::info!("Logging out");
    match state.api.request(&ApiRequest::post("logout")).await {
        Outcome::Response(r) if r.status().is_success() => {}
        Outcome::Response(r) => {
            log::warn!("Server logout returned {} (continuing local cleanup)", r.status())
        }
        Outcome::Aborted => log::warn!("Server logout timed out (continuing local cleanup)"),
        Outcome::Unreachable(e) => {
            log::warn!("Server logout failed (continuing local cleanup): {}", e)
        }
        Outcome::SignedOut => {}
    }

    for kind in TokenKind::ALL {
        state.store.delete(kind)?;
    }
    state.session.dispatch(AuthAction::SignOut);

    log::info!("Logout complete");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockito::{Matcher, Server};

    use super::*;
    use crate::api::auth::memory::MemoryStore;
    use crate::config::Config;
    use crate::location::CheckInSite;
    use crate::session::AuthState;

    const SITE: Coordinates = Coordinates {
        latitude: 35.1336,
        longitude: 129.1030,
    };

    fn state_for(server: &Server, store: Arc<MemoryStore>) -> AppState {
        let config = Config {
            api_url: server.url(),
            checkin_site: Some(CheckInSite {
                center: SITE,
                radius_meters: 50.0,
            }),
            ..Config::default()
        };
        AppState::with_store(&config, store)
    }

    #[tokio::test]
    async fn test_validate_token_returns_profile() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/validateToken")
            .match_header("authorization", "Bearer A1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"user_id": "202099999", "name": "Lee"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        let profile = validate_token(&state).await.unwrap();
        mock.assert_async().await;
        assert_eq!(profile.user_id, "202099999");
    }

    #[tokio::test]
    async fn test_validate_token_failure_signs_out() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/validateToken")
            .with_status(500)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store.clone());

        let err = validate_token(&state).await.unwrap_err();
        assert!(matches!(err, ClientError::SignedOut));
        assert_eq!(state.session.current(), AuthState::SignedOut);
        assert!(store.token(TokenKind::Refresh).is_none());
    }

    #[tokio::test]
    async fn test_fetch_records() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/reservations/user/202099999")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "id": 4,
                    "user_id": "202099999",
                    "start_time": "2025-01-03-21-00-00",
                    "end_time": "2025-01-03-22-00-00",
                    "room_id": 1,
                    "status": "cancelled",
                    "location_status": "failed",
                    "created_at": "2025-01-03-16-06-11"
                }]"#,
            )
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        let records = fetch_records(&state, "202099999").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].can_cancel());
    }

    #[tokio::test]
    async fn test_cancel_sends_form_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/reservations/4")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::UrlEncoded("reservation_id".into(), "4".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "cancelled"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        let message = cancel_reservation(&state, 4).await.unwrap();
        mock.assert_async().await;
        assert_eq!(message, "cancelled");
    }

    #[tokio::test]
    async fn test_cancel_rejection_carries_server_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/reservations/5")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "already started"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        match cancel_reservation(&state, 5).await.unwrap_err() {
            ClientError::Rejected { status, message } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(message, "already started");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_verify_outside_radius_makes_no_call() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/reservations/verify/7")
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        let far = Coordinates {
            latitude: SITE.latitude + 0.01,
            longitude: SITE.longitude,
        };
        let err = verify_location(&state, 7, far).await.unwrap_err();
        mock.assert_async().await;
        assert!(matches!(err, ClientError::TooFar(_)));
    }

    #[tokio::test]
    async fn test_verify_inside_radius() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/reservations/verify/7")
            .match_body(Matcher::UrlEncoded("reservation_id".into(), "7".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "verified"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store);

        let (distance, message) = verify_location(&state, 7, SITE).await.unwrap();
        mock.assert_async().await;
        assert_eq!(distance, 0.0);
        assert_eq!(message, "verified");
    }

    #[tokio::test]
    async fn test_logout_clears_tokens_even_if_server_fails() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/logout")
            .with_status(500)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), Some("R1")));
        let state = state_for(&server, store.clone());

        assert!(logout(&state).await.unwrap());
        mock.assert_async().await;
        assert!(store.token(TokenKind::Access).is_none());
        assert!(store.token(TokenKind::Refresh).is_none());
        assert_eq!(state.session.current(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_logout_without_refresh_token_is_noop() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/logout")
            .expect(0)
            .create_async()
            .await;

        let store = Arc::new(MemoryStore::with_tokens(Some("A1"), None));
        let state = state_for(&server, store.clone());

        assert!(!logout(&state).await.unwrap());
        mock.assert_async().await;
        assert_eq!(store.token(TokenKind::Access).as_deref(), Some("A1"));
    }

    #[test]
    fn test_store_tokens_signs_in() {
        let store = Arc::new(MemoryStore::default());
        let state = AppState::with_store(&Config::default(), store.clone());
        assert_eq!(state.session.current(), AuthState::SignedOut);

        store_tokens(&state, "A1", "R1").unwrap();

        assert_eq!(state.session.current(), AuthState::SignedIn);
        assert_eq!(store.token(TokenKind::Refresh).as_deref(), Some("R1"));
    }
}
