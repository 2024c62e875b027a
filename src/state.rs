//! Application state for the practice-room client.
//!
//! Wires the credential store, the session dispatcher, and the API client
//! together. The dispatcher is passed to the client explicitly, so there is
//! no global to initialize before the first request.

use std::sync::Arc;

use crate::api::auth::{CredentialStore, KeychainStore};
use crate::api::client::ApiClient;
use crate::config::Config;
use crate::location::CheckInSite;
use crate::session::Session;

pub struct AppState {
    /// HTTP pipeline for every backend call.
    pub api: Arc<ApiClient>,

    /// Signed-in/signed-out state and the sign-out dispatcher.
    pub session: Arc<Session>,

    /// Durable token store shared with the pipeline.
    pub store: Arc<dyn CredentialStore>,

    /// Configured check-in location, if any.
    pub checkin_site: Option<CheckInSite>,
}

impl AppState {
    /// Create state backed by the platform keychain.
    pub fn new(config: &Config) -> Self {
        Self::with_store(config, Arc::new(KeychainStore::new(&config.keychain_service)))
    }

    pub fn with_store(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        let session = Arc::new(Session::new(store.clone()));
        let api = Arc::new(ApiClient::new(config, store.clone(), session.clone()));
        Self {
            api,
            session,
            store,
            checkin_site: config.checkin_site,
        }
    }
}
