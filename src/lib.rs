//! Client for the university practice-room reservation backend.
//!
//! The core is the authenticated request pipeline in [`api::client`]: bearer
//! token injection, per-call timeout, single-flight token refresh with one
//! retry, and sign-out when credentials cannot be recovered. The reservation
//! operations in [`commands`] are thin calls on top of it.

pub mod api;
pub mod commands;
pub mod config;
pub mod location;
pub mod session;
pub mod state;
