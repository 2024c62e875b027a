//! API client module for the practice-room client.
//!
//! Provides the authenticated request pipeline, keychain token storage,
//! and request/response types matching the reservation backend API.

pub mod auth;
pub mod client;
pub mod types;
